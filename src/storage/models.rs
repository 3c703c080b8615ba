use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Creator name used when no display name has been set
pub const ANONYMOUS: &str = "Anonymous";

/// A required field was missing or malformed. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

fn default_creator() -> String {
    ANONYMOUS.to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn require(value: &str, message: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(message));
    }
    Ok(())
}

fn require_date(date: &str) -> Result<(), ValidationError> {
    require(date, "Event date is required")?;
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map(|_| ())
        .map_err(|e| ValidationError(format!("Invalid event date '{}': {}", date, e)))
}

/// Identifier of a record within one collection.
///
/// Remote ids are assigned by the document store. Local ids are issued on the
/// fallback path and are derived from the wall clock in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Local(i64),
    Remote(String),
}

impl RecordId {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// The remote document id, if this record came from the remote store
    pub fn as_remote(&self) -> Option<&str> {
        match self {
            Self::Remote(id) => Some(id),
            Self::Local(_) => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "{}", id),
            Self::Remote(id) => f.write_str(id),
        }
    }
}

impl FromStr for RecordId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::new("Record id is required"));
        }
        Ok(match s.parse::<i64>() {
            Ok(id) => Self::Local(id),
            Err(_) => Self::Remote(s.to_string()),
        })
    }
}

// ===== Events =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub title: String,
    /// Calendar date, `YYYY-MM-DD`
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_creator")]
    pub created_by: String,
}

impl Event {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.title, "Event title is required")?;
        require_date(&self.date)
    }

    pub fn apply_patch(&mut self, patch: &EventPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(date) = &patch.date {
            self.date = date.clone();
        }
        if let Some(time) = &patch.time {
            self.time = time.clone();
        }
        if let Some(location) = &patch.location {
            self.location = location.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
    }
}

/// User input for a new event
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub title: String,
    pub date: String,
    pub time: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl EventDraft {
    pub fn new(title: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            date: date.into(),
            ..Default::default()
        }
    }

    pub fn into_event(self, created_by: &str) -> Event {
        Event {
            id: None,
            title: self.title.trim().to_string(),
            date: self.date.trim().to_string(),
            time: self.time.unwrap_or_default(),
            location: self.location.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            created_by: created_by.to_string(),
        }
    }
}

/// Partial update of an event; only set fields are written
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EventPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            require(title, "Event title is required")?;
        }
        if let Some(date) = &self.date {
            require_date(date)?;
        }
        Ok(())
    }
}

// ===== Tasks =====

/// Fixed set of task groups on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Design,
    Research,
    Procurement,
    Assembly,
    Testing,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 5] = [
        Self::Design,
        Self::Research,
        Self::Procurement,
        Self::Assembly,
        Self::Testing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Design => "design",
            Self::Research => "research",
            Self::Procurement => "procurement",
            Self::Assembly => "assembly",
            Self::Testing => "testing",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::new("Task category is required"));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError(format!("Unknown task category '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub title: String,
    pub category: TaskCategory,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "default_creator")]
    pub created_by: String,
}

impl Task {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.title, "Task title is required")
    }

    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
    }
}

/// User input for a new task. The category arrives as free text and is
/// checked against the fixed set.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub category: String,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
        }
    }

    pub fn into_task(self, created_by: &str) -> Result<Task, ValidationError> {
        require(&self.title, "Task title is required")?;
        let category = self.category.parse()?;
        Ok(Task {
            id: None,
            title: self.title.trim().to_string(),
            category,
            completed: false,
            created_by: created_by.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<TaskCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            require(title, "Task title is required")?;
        }
        Ok(())
    }
}

// ===== Links =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkCategory {
    Course,
    Technical,
    Communication,
    External,
    Documents,
}

impl LinkCategory {
    pub const ALL: [LinkCategory; 5] = [
        Self::Course,
        Self::Technical,
        Self::Communication,
        Self::External,
        Self::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::Technical => "technical",
            Self::Communication => "communication",
            Self::External => "external",
            Self::Documents => "documents",
        }
    }

    /// Heading shown above the group
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Course => "Course Materials",
            Self::Technical => "Technical Resources",
            Self::Communication => "Team Communication",
            Self::External => "External Resources",
            Self::Documents => "Project Documents",
        }
    }
}

impl fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::new("Link category is required"));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError(format!("Unknown link category '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub title: String,
    pub url: String,
    pub category: LinkCategory,
    /// Sourced from a local file rather than a web address
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_uploaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl Link {
    pub fn new(title: &str, url: &str, category: LinkCategory) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            url: url.to_string(),
            category,
            is_uploaded: false,
            file_name: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.title, "Link title is required")?;
        require(&self.url, "Link URL is required")
    }

    /// Whether the link points at a PDF that can be opened in the viewer
    pub fn is_document(&self) -> bool {
        let path = self
            .url
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        path.to_ascii_lowercase().ends_with(".pdf")
    }

    pub fn apply_patch(&mut self, patch: &LinkPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(url) = &patch.url {
            self.url = url.clone();
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinkDraft {
    pub title: String,
    pub url: String,
    pub category: String,
}

impl LinkDraft {
    pub fn new(title: impl Into<String>, url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            category: category.into(),
        }
    }

    pub fn into_link(self) -> Result<Link, ValidationError> {
        require(&self.title, "Link title is required")?;
        require(&self.url, "Link URL is required")?;
        let category = self.category.parse()?;
        Ok(Link::new(self.title.trim(), self.url.trim(), category))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<LinkCategory>,
}

impl LinkPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            require(title, "Link title is required")?;
        }
        if let Some(url) = &self.url {
            require(url, "Link URL is required")?;
        }
        Ok(())
    }
}

/// A link as it appears inside a category group of the persisted mapping.
/// The category is implied by the group key.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedLink {
    #[serde(default)]
    id: Option<RecordId>,
    title: String,
    url: String,
    #[serde(default)]
    is_uploaded: bool,
    #[serde(default)]
    file_name: Option<String>,
}

/// Links grouped by category, insertion order within a group.
///
/// Persisted as `{ "course": [...], "technical": [...], ... }`. Empty groups
/// are dropped so two equal collections always compare equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<LinkCategory, Vec<GroupedLink>>",
    into = "BTreeMap<LinkCategory, Vec<Link>>"
)]
pub struct Links {
    groups: BTreeMap<LinkCategory, Vec<Link>>,
}

impl From<BTreeMap<LinkCategory, Vec<GroupedLink>>> for Links {
    fn from(groups: BTreeMap<LinkCategory, Vec<GroupedLink>>) -> Self {
        let groups = groups
            .into_iter()
            .filter(|(_, links)| !links.is_empty())
            .map(|(category, links)| {
                let links = links
                    .into_iter()
                    .map(|l| Link {
                        id: l.id,
                        title: l.title,
                        url: l.url,
                        category,
                        is_uploaded: l.is_uploaded,
                        file_name: l.file_name,
                    })
                    .collect();
                (category, links)
            })
            .collect();
        Self { groups }
    }
}

impl From<Links> for BTreeMap<LinkCategory, Vec<Link>> {
    fn from(links: Links) -> Self {
        links.groups
    }
}

impl Links {
    /// Built-in links every new board starts with
    pub fn defaults() -> Self {
        use LinkCategory::*;
        Self::from_records(vec![
            Link::new("Concept Generation Guide", "pdfs/Concept Generation Guide.pdf", Course),
            Link::new("Capacitors and Motors", "pdfs/Capacitors and Motors.pdf", Technical),
            Link::new("Discord Server", "https://discord.gg/example", Communication),
            Link::new("Slack Workspace", "https://slack.com/example", Communication),
            Link::new("Google Drive", "https://drive.google.com/example", Communication),
            Link::new("Solar Car Competitions", "https://www.worldsolarchallenge.org/", External),
            Link::new("Engineering Forums", "https://www.engineering.com/", External),
            Link::new("Project Brief", "pdfs/Project Brief.pdf", Documents),
        ])
    }

    /// Group a flat list, keeping the relative order of each category
    pub fn from_records(records: Vec<Link>) -> Self {
        let mut links = Self::default();
        for link in records {
            links.push(link);
        }
        links
    }

    pub fn push(&mut self, link: Link) {
        self.groups.entry(link.category).or_default().push(link);
    }

    /// Links of one category; empty when the category has none
    pub fn group(&self, category: LinkCategory) -> &[Link] {
        self.groups.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Categories that currently hold at least one link
    pub fn categories(&self) -> impl Iterator<Item = LinkCategory> + '_ {
        self.groups.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.groups.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn find(&self, id: &RecordId) -> Option<&Link> {
        self.iter().find(|l| l.id.as_ref() == Some(id))
    }

    /// Remove a link by id, returning it
    pub fn remove(&mut self, id: &RecordId) -> Option<Link> {
        let (category, index) = self.groups.iter().find_map(|(category, links)| {
            links
                .iter()
                .position(|l| l.id.as_ref() == Some(id))
                .map(|index| (*category, index))
        })?;

        let group = self.groups.get_mut(&category)?;
        let removed = group.remove(index);
        if group.is_empty() {
            self.groups.remove(&category);
        }
        Some(removed)
    }

    /// Apply a patch in place. A category change moves the link to the end of
    /// its new group.
    pub fn update(&mut self, id: &RecordId, patch: &LinkPatch) -> bool {
        match patch.category {
            Some(category) if self.find(id).is_some_and(|l| l.category != category) => {
                let Some(mut link) = self.remove(id) else {
                    return false;
                };
                link.apply_patch(patch);
                self.push(link);
                true
            }
            _ => match self
                .groups
                .values_mut()
                .flatten()
                .find(|l| l.id.as_ref() == Some(id))
            {
                Some(link) => {
                    link.apply_patch(patch);
                    true
                }
                None => false,
            },
        }
    }
}

// ===== Morph chart =====

/// The single shared brainstorming grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MorphChart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub header: Vec<String>,
    /// Rows of free-text cells
    #[serde(default)]
    pub table: Vec<Vec<String>>,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_creator")]
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl MorphChart {
    pub fn new(header: Vec<String>, table: Vec<Vec<String>>, notes: String, updated_by: &str) -> Self {
        Self {
            id: None,
            header,
            table,
            notes,
            updated_by: updated_by.to_string(),
            updated_at: Utc::now(),
        }
    }

    /// Every row must have exactly one cell per header column
    pub fn validate(&self) -> Result<(), ValidationError> {
        let width = self.header.len();
        if let Some((index, row)) = self
            .table
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != width)
        {
            return Err(ValidationError(format!(
                "Morph chart row {} has {} cells, expected {}",
                index + 1,
                row.len(),
                width
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_untagged_round_trip() {
        let ids = vec![RecordId::Local(1700000000000), RecordId::Remote("abc123".to_string())];
        let json = serde_json::to_string(&ids).unwrap();
        assert_eq!(json, r#"[1700000000000,"abc123"]"#);

        let back: Vec<RecordId> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ids);
        assert_eq!("42".parse::<RecordId>().unwrap(), RecordId::Local(42));
        assert!("".parse::<RecordId>().is_err());
    }

    #[test]
    fn test_event_validation() {
        let ok = EventDraft::new("Design review", "2025-03-14").into_event(ANONYMOUS);
        assert!(ok.validate().is_ok());
        assert_eq!(ok.created_by, "Anonymous");

        let no_title = EventDraft::new("  ", "2025-03-14").into_event(ANONYMOUS);
        assert!(no_title.validate().is_err());

        let bad_date = EventDraft::new("Review", "14/03/2025").into_event(ANONYMOUS);
        assert!(bad_date.validate().is_err());
    }

    #[test]
    fn test_task_category_parsing() {
        assert_eq!("Procurement".parse::<TaskCategory>().unwrap(), TaskCategory::Procurement);
        assert!("marketing".parse::<TaskCategory>().is_err());

        let err = TaskDraft::new("Buy bolts", "").into_task(ANONYMOUS).unwrap_err();
        assert_eq!(err.0, "Task category is required");
    }

    #[test]
    fn test_legacy_links_without_category_field() {
        // Groups written by older boards carry no category on each entry
        let json = r#"{
            "communication": [{"title": "Discord Server", "url": "https://discord.gg/example"}],
            "documents": [{"title": "Brief", "url": "blob:abc", "isUploaded": true, "fileName": "brief.pdf"}]
        }"#;
        let links: Links = serde_json::from_str(json).unwrap();

        assert_eq!(links.len(), 2);
        assert_eq!(links.group(LinkCategory::Communication)[0].category, LinkCategory::Communication);
        let upload = &links.group(LinkCategory::Documents)[0];
        assert!(upload.is_uploaded);
        assert_eq!(upload.file_name.as_deref(), Some("brief.pdf"));
        assert!(links.group(LinkCategory::Course).is_empty());
    }

    #[test]
    fn test_default_links() {
        let links = Links::defaults();
        assert_eq!(links.categories().count(), 5);
        assert_eq!(links.len(), 8);
        assert_eq!(links.group(LinkCategory::Communication).len(), 3);
        assert_eq!(links.group(LinkCategory::Communication)[1].title, "Slack Workspace");
    }

    #[test]
    fn test_links_remove_drops_empty_group() {
        let mut link = Link::new("Project Brief", "pdfs/Project Brief.pdf", LinkCategory::Documents);
        link.id = Some(RecordId::Local(7));
        let mut links = Links::from_records(vec![link]);

        assert!(links.remove(&RecordId::Local(7)).is_some());
        assert!(links.is_empty());
        assert_eq!(links, Links::default());
        assert!(links.remove(&RecordId::Local(7)).is_none());
    }

    #[test]
    fn test_links_update_moves_category() {
        let mut a = Link::new("A", "https://a.example", LinkCategory::Course);
        a.id = Some(RecordId::Local(1));
        let mut b = Link::new("B", "https://b.example", LinkCategory::External);
        b.id = Some(RecordId::Local(2));
        let mut links = Links::from_records(vec![a, b]);

        let patch = LinkPatch {
            category: Some(LinkCategory::External),
            ..Default::default()
        };
        assert!(links.update(&RecordId::Local(1), &patch));
        assert!(links.group(LinkCategory::Course).is_empty());
        let external: Vec<_> = links.group(LinkCategory::External).iter().map(|l| l.title.as_str()).collect();
        assert_eq!(external, vec!["B", "A"]);
        assert!(!links.update(&RecordId::Local(99), &patch));
    }

    #[test]
    fn test_is_document() {
        let pdf = Link::new("Brief", "pdfs/Project Brief.PDF?v=2", LinkCategory::Documents);
        let web = Link::new("Forum", "https://www.engineering.com/", LinkCategory::External);
        assert!(pdf.is_document());
        assert!(!web.is_document());
    }

    #[test]
    fn test_morph_chart_must_be_rectangular() {
        let header = vec!["Function".to_string(), "Option A".to_string()];
        let good = MorphChart::new(
            header.clone(),
            vec![vec!["Drive".to_string(), "Hub motor".to_string()]],
            String::new(),
            ANONYMOUS,
        );
        assert!(good.validate().is_ok());

        let ragged = MorphChart::new(header, vec![vec!["Drive".to_string()]], String::new(), ANONYMOUS);
        assert!(ragged.validate().is_err());
    }
}
