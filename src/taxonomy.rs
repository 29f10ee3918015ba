//! Canonical label space of merged annotations.

use std::fmt;

/// The closed set of object classes kept in merged annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Person,
    Dog,
    Cat,
    Car,
    Tree,
}

impl Label {
    pub const ALL: [Label; 5] = [Label::Person, Label::Dog, Label::Cat, Label::Car, Label::Tree];

    pub fn id(self) -> u32 {
        match self {
            Label::Person => 0,
            Label::Dog => 1,
            Label::Cat => 2,
            Label::Car => 3,
            Label::Tree => 4,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Label::Person),
            1 => Some(Label::Dog),
            2 => Some(Label::Cat),
            3 => Some(Label::Car),
            4 => Some(Label::Tree),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Label::Person => "Person",
            Label::Dog => "Dog",
            Label::Cat => "Cat",
            Label::Car => "Car",
            Label::Tree => "Tree",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Display name for a class id, falling back to `class_<id>` outside the taxonomy.
pub fn class_name(id: u32) -> String {
    match Label::from_id(id) {
        Some(label) => label.name().to_string(),
        None => format!("class_{id}"),
    }
}
