//! Bootstrap progress reporting.
//!
//! Progress values are transient: pushed synchronously to the injected
//! hook (typically a GUI renderer), never stored. The hook must not
//! block.

use crate::dock::PuppyType;

/// Stage of the bootstrap sequence, in order of occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashingStage {
    Start,
    Discovery,
    CalculateFingerprint,
    CheckFingerprint,
    Flashing,
    Done,
}

/// One progress update pushed to the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 0..=100 across the whole bootstrap.
    pub percent: u8,
    pub stage: FlashingStage,
    pub puppy_type: Option<PuppyType>,
}

impl Progress {
    pub fn new(percent: u8, stage: FlashingStage) -> Self {
        Self {
            percent,
            stage,
            puppy_type: None,
        }
    }

    pub fn with_puppy(percent: u8, stage: FlashingStage, puppy_type: PuppyType) -> Self {
        Self {
            percent,
            stage,
            puppy_type: Some(puppy_type),
        }
    }

    /// Operator-facing description of what is happening right now.
    pub fn description(&self) -> &'static str {
        match (self.stage, self.puppy_type) {
            (FlashingStage::Start, _) => "Waking up puppies",
            (FlashingStage::Discovery, _) => "Looking for puppies",
            (FlashingStage::CalculateFingerprint, _) => "Verifying puppies",
            (FlashingStage::CheckFingerprint, Some(puppy)) => match puppy {
                PuppyType::BedController => "Verifying bed",
                PuppyType::ToolHead => "Verifying tool",
                PuppyType::Extension => "Verifying extension",
            },
            (FlashingStage::CheckFingerprint, None) => "Verifying puppies",
            (FlashingStage::Flashing, Some(puppy)) => match puppy {
                PuppyType::BedController => "Flashing bed",
                PuppyType::ToolHead => "Flashing tool",
                PuppyType::Extension => "Flashing extension",
            },
            (FlashingStage::Flashing, None) => "Flashing",
            // The GUI prints nothing for the last sliver of init.
            (FlashingStage::Done, _) => "",
        }
    }
}

/// Injected progress sink. Called synchronously and repeatedly; must not
/// block or panic.
pub type ProgressHook = Box<dyn FnMut(Progress) + Send>;
