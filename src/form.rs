//! Traveller form state: five positional slots and an editor copy.
//!
//! Slots are created once and never added or removed. They change through an
//! editor save or an extraction merge, and both recompute completeness.

use regex::Regex;
use serde::Serialize;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::mapping::{to_swedish, MappedField, UNKNOWN_NATIONALITY};
use crate::schema::{ExtractedTraveller, ExtractionResult, GlobalInfo};

/// Number of traveller slots in the form.
pub const SLOT_COUNT: usize = 5;

/// Shown in place of a missing last name in the summary list.
const PLACEHOLDER_LABEL: &str = "Vuxen 18+";

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("no traveller slot with id {0}")]
    NoSuchSlot(u8),

    #[error("no traveller is being edited")]
    NoEditor,

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("'{value}' is not a valid choice for {field:?}")]
    InvalidChoice { field: SlotField, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("received invalid data from AI: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One positional traveller record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TravellerSlot {
    id: u8,
    pub first_name: String,
    pub last_name: String,
    /// Free text; the editor asks for eight digits, YYYYMMDD.
    pub date_of_birth: String,
    pub nationality: String,
    pub gender: String,
    pub disability: String,
    pub member_number: String,
    is_complete: bool,
}

impl TravellerSlot {
    fn empty(id: u8) -> Self {
        Self {
            id,
            first_name: String::new(),
            last_name: String::new(),
            date_of_birth: String::new(),
            nationality: String::new(),
            gender: String::new(),
            disability: String::new(),
            member_number: String::new(),
            is_complete: false,
        }
    }

    /// 1-based position in the form.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Completeness as of the last save or merge.
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Whether the required fields are filled in right now.
    ///
    /// Disability is always defined on a slot (possibly empty) and so never
    /// blocks completion; member number is optional.
    pub fn required_fields_filled(&self) -> bool {
        !self.first_name.is_empty()
            && !self.last_name.is_empty()
            && !self.date_of_birth.is_empty()
            && !self.nationality.is_empty()
            && self.nationality != UNKNOWN_NATIONALITY
            && !self.gender.is_empty()
    }

    fn refresh(&mut self) {
        self.is_complete = self.required_fields_filled();
    }

    /// One line for the summary list, e.g. `✓ John Smith (Sverige)`.
    pub fn summary_line(&self) -> String {
        let mark = if self.is_complete { "✓ " } else { "" };
        let last = if self.last_name.is_empty() {
            PLACEHOLDER_LABEL
        } else {
            self.last_name.as_str()
        };
        let name = format!("{} {}", self.first_name, last);
        let mut line = format!("{}{}", mark, name.trim_start());
        if !self.nationality.is_empty() {
            line.push_str(&format!(" ({})", self.nationality));
        }
        line
    }

    /// Set a field from the editor. Choice fields only accept their listed values.
    pub fn set(&mut self, field: SlotField, value: impl Into<String>) -> Result<(), EditError> {
        let value = value.into();

        if let Some(mapped) = field.choice_table() {
            if !mapped.choices().contains(&value.as_str()) {
                return Err(EditError::InvalidChoice { field, value });
            }
        }

        *self.field_mut(field) = value;
        Ok(())
    }

    pub fn get(&self, field: SlotField) -> &str {
        match field {
            SlotField::FirstName => &self.first_name,
            SlotField::LastName => &self.last_name,
            SlotField::DateOfBirth => &self.date_of_birth,
            SlotField::Nationality => &self.nationality,
            SlotField::Gender => &self.gender,
            SlotField::Disability => &self.disability,
            SlotField::MemberNumber => &self.member_number,
        }
    }

    fn field_mut(&mut self, field: SlotField) -> &mut String {
        match field {
            SlotField::FirstName => &mut self.first_name,
            SlotField::LastName => &mut self.last_name,
            SlotField::DateOfBirth => &mut self.date_of_birth,
            SlotField::Nationality => &mut self.nationality,
            SlotField::Gender => &mut self.gender,
            SlotField::Disability => &mut self.disability,
            SlotField::MemberNumber => &mut self.member_number,
        }
    }

    /// Overwrite fields with one extracted traveller. Empty values never win.
    fn merge_extracted(&mut self, traveller: &ExtractedTraveller, global: &GlobalInfo) {
        if let Some(first) = non_empty(&traveller.first_name) {
            self.first_name = first.to_string();
        }
        if let Some(last) = non_empty(&traveller.last_name) {
            self.last_name = last.to_string();
        }
        if let Some(born) = non_empty(&traveller.date_of_birth) {
            self.date_of_birth = normalize_birth_date(born);
        }
        if let Some(gender) = non_empty(&traveller.gender).map(|g| to_swedish(g, MappedField::Gender)) {
            if !gender.is_empty() {
                self.gender = gender.to_string();
            }
        }

        let nationality = non_empty(&traveller.nationality)
            .or_else(|| global.nationality.as_deref().and_then(non_empty))
            .map(|n| to_swedish(n, MappedField::Nationality));
        if let Some(n) = nationality.and_then(non_empty) {
            self.nationality = n.to_string();
        }
        if self.nationality == UNKNOWN_NATIONALITY {
            self.nationality.clear();
        }

        let disability = traveller
            .disability
            .as_deref()
            .and_then(non_empty)
            .or_else(|| global.disability.as_deref().and_then(non_empty))
            .map(|d| to_swedish(d, MappedField::Disability));
        if let Some(d) = disability.and_then(non_empty) {
            self.disability = d.to_string();
        }

        self.refresh();
    }
}

/// Editable slot fields, named as in the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotField {
    FirstName,
    LastName,
    DateOfBirth,
    Nationality,
    Gender,
    Disability,
    MemberNumber,
}

impl SlotField {
    fn choice_table(self) -> Option<MappedField> {
        match self {
            Self::Nationality => Some(MappedField::Nationality),
            Self::Gender => Some(MappedField::Gender),
            Self::Disability => Some(MappedField::Disability),
            _ => None,
        }
    }
}

impl FromStr for SlotField {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firstName" => Ok(Self::FirstName),
            "lastName" => Ok(Self::LastName),
            "dateOfBirth" => Ok(Self::DateOfBirth),
            "nationality" => Ok(Self::Nationality),
            "gender" => Ok(Self::Gender),
            "disability" => Ok(Self::Disability),
            "memberNumber" => Ok(Self::MemberNumber),
            other => Err(EditError::UnknownField(other.to_string())),
        }
    }
}

/// The five slots plus the copy currently open in the editor, if any.
#[derive(Debug, Clone)]
pub struct TravellerForm {
    slots: [TravellerSlot; SLOT_COUNT],
    editor: Option<TravellerSlot>,
}

impl Default for TravellerForm {
    fn default() -> Self {
        Self::new()
    }
}

impl TravellerForm {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|idx| TravellerSlot::empty(idx as u8 + 1)),
            editor: None,
        }
    }

    pub fn slots(&self) -> &[TravellerSlot] {
        &self.slots
    }

    pub fn slot(&self, id: u8) -> Option<&TravellerSlot> {
        self.slots.iter().find(|s| s.id == id)
    }

    /// Open the editor on a copy of slot `id`. Edits stay on the copy until saved.
    pub fn select_slot(&mut self, id: u8) -> Result<&mut TravellerSlot, EditError> {
        let slot = self.slot(id).cloned().ok_or(EditError::NoSuchSlot(id))?;
        Ok(self.editor.insert(slot))
    }

    pub fn editor(&self) -> Option<&TravellerSlot> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Result<&mut TravellerSlot, EditError> {
        self.editor.as_mut().ok_or(EditError::NoEditor)
    }

    /// Write the editor copy back over the slot with the same id and close the editor.
    ///
    /// Returns the saved slot's id, or `None` when no editor was open.
    pub fn save_slot(&mut self) -> Option<u8> {
        let mut edited = self.editor.take()?;
        edited.refresh();

        let id = edited.id;
        if let Some(slot) = self.slots.iter_mut().find(|s| s.id == id) {
            *slot = edited;
            debug!("Traveller {} saved", id);
        }
        Some(id)
    }

    /// Discard the editor copy.
    pub fn close_editor(&mut self) {
        self.editor = None;
    }

    /// Merge a raw endpoint response into the slots.
    ///
    /// A response that does not parse as an extraction result (e.g. a missing
    /// or non-array `travellers`) leaves every slot untouched.
    pub fn merge_response(&mut self, response: &serde_json::Value) -> Result<usize, MergeError> {
        let result: ExtractionResult = serde_json::from_value(response.clone()).map_err(|e| {
            warn!("Invalid data structure received from AI: {}", e);
            MergeError::Malformed(e)
        })?;
        Ok(self.merge_extraction_result(&result))
    }

    /// Merge extracted travellers into slots by position. Returns how many slots were touched.
    ///
    /// Matching is by index only: traveller `i` lands in slot `i + 1`
    /// regardless of who was there before.
    pub fn merge_extraction_result(&mut self, result: &ExtractionResult) -> usize {
        let count = result.travellers.len().min(SLOT_COUNT);
        for (slot, traveller) in self.slots.iter_mut().zip(&result.travellers) {
            slot.merge_extracted(traveller, &result.global_info);
        }
        debug!("Merged {} extracted travellers into the form", count);
        count
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// `1990-05-02`, `1990/05/02`, `1990.05.02` and `19900502` all become `19900502`.
/// Anything else is kept as written.
pub fn normalize_birth_date(value: &str) -> String {
    static DATE: OnceLock<Regex> = OnceLock::new();
    let re = DATE.get_or_init(|| {
        Regex::new(r"^(\d{4})[-./ ]?(\d{2})[-./ ]?(\d{2})$").expect("birth date pattern is valid")
    });

    match re.captures(value.trim()) {
        Some(caps) => format!("{}{}{}", &caps[1], &caps[2], &caps[3]),
        None => value.to_string(),
    }
}
