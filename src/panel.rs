use std::fmt;
use std::str::FromStr;

use crate::records::MedicineRecord;

/// Secondary detail categories shown under a recognised medicine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailTopic {
    SideEffects,
    FoodRestrictions,
    NegativeInteractions,
    MissedDose,
    Storage,
}

impl DetailTopic {
    pub const ALL: [DetailTopic; 5] = [
        DetailTopic::SideEffects,
        DetailTopic::FoodRestrictions,
        DetailTopic::NegativeInteractions,
        DetailTopic::MissedDose,
        DetailTopic::Storage,
    ];

    pub fn key(self) -> &'static str {
        match self {
            DetailTopic::SideEffects => "side_effects",
            DetailTopic::FoodRestrictions => "food_restrictions",
            DetailTopic::NegativeInteractions => "negative_interactions",
            DetailTopic::MissedDose => "missed_dose",
            DetailTopic::Storage => "storage",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            DetailTopic::SideEffects => "Efek Samping",
            DetailTopic::FoodRestrictions => "Pantangan Makanan",
            DetailTopic::NegativeInteractions => "Interaksi Negatif",
            DetailTopic::MissedDose => "Jika Lupa Minum?",
            DetailTopic::Storage => "Cara Penyimpanan",
        }
    }

    /// Spoken before the field value. Side effects name the medicine.
    pub fn prefix(self, medicine_name: &str) -> String {
        match self {
            DetailTopic::SideEffects => format!("Efek samping dari {medicine_name}: "),
            DetailTopic::FoodRestrictions => "Pantangan makanan: ".into(),
            DetailTopic::NegativeInteractions => "Interaksi negatif: ".into(),
            DetailTopic::MissedDose => "Jika lupa minum: ".into(),
            DetailTopic::Storage => "Cara penyimpanan: ".into(),
        }
    }

    /// The record field this topic reads.
    pub fn field(self, record: &MedicineRecord) -> &Option<String> {
        match self {
            DetailTopic::SideEffects => &record.side_effects,
            DetailTopic::FoodRestrictions => &record.food_restrictions,
            DetailTopic::NegativeInteractions => &record.negative_interactions,
            DetailTopic::MissedDose => &record.missed_dose,
            DetailTopic::Storage => &record.storage,
        }
    }
}

impl fmt::Display for DetailTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTopic(pub String);

impl fmt::Display for UnknownTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = DetailTopic::ALL.iter().map(|t| t.key()).collect();
        write!(f, "unknown topic '{}', expected one of: {}", self.0, keys.join(", "))
    }
}

impl std::error::Error for UnknownTopic {}

impl FromStr for DetailTopic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let topic = match key.as_str() {
            "side_effects" | "efek_samping" => DetailTopic::SideEffects,
            "food_restrictions" | "pantangan" | "pantangan_makanan" => DetailTopic::FoodRestrictions,
            "negative_interactions" | "interaksi" | "interaksi_negatif" => {
                DetailTopic::NegativeInteractions
            }
            "missed_dose" | "lupa_minum" | "jika_lupa_minum" => DetailTopic::MissedDose,
            "storage" | "penyimpanan" => DetailTopic::Storage,
            _ => return Err(UnknownTopic(s.to_string())),
        };
        Ok(topic)
    }
}

/// Which detail topic, if any, is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelState {
    #[default]
    NoneActive,
    ActiveTopic(DetailTopic),
}

/// What a selection did. Every transition stops in-flight narration first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened(DetailTopic),
    Closed(DetailTopic),
    Switched { from: DetailTopic, to: DetailTopic },
}

impl Transition {
    /// Topic to narrate after the transition, if one became active.
    pub fn entered(self) -> Option<DetailTopic> {
        match self {
            Transition::Opened(t) | Transition::Switched { to: t, .. } => Some(t),
            Transition::Closed(_) => None,
        }
    }
}

impl PanelState {
    pub fn active(&self) -> Option<DetailTopic> {
        match self {
            PanelState::NoneActive => None,
            PanelState::ActiveTopic(t) => Some(*t),
        }
    }

    /// Toggle `topic`: open it, close it if already open, or switch to it.
    pub fn select(&mut self, topic: DetailTopic) -> Transition {
        let transition = match *self {
            PanelState::NoneActive => Transition::Opened(topic),
            PanelState::ActiveTopic(current) if current == topic => Transition::Closed(topic),
            PanelState::ActiveTopic(current) => Transition::Switched {
                from: current,
                to: topic,
            },
        };
        *self = match transition.entered() {
            Some(t) => PanelState::ActiveTopic(t),
            None => PanelState::NoneActive,
        };
        transition
    }

    pub fn reset(&mut self) {
        *self = PanelState::NoneActive;
    }
}
