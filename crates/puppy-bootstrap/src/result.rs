//! Discovery occupancy bitmask.

use crate::dock::{DOCK_COUNT, Dock};
use serde::{Deserialize, Serialize};

/// One bit per dock meaning "a puppy answered here".
///
/// Created empty, mutated only during discovery, read-only afterwards.
/// The result of a successful attempt doubles as the minimal required
/// configuration for any later attempt within the same power cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub docks_preset: u8,
}

impl BootstrapResult {
    pub const EMPTY: BootstrapResult = BootstrapResult { docks_preset: 0 };

    /// Build a mask from an explicit dock list.
    pub fn from_docks(docks: &[Dock]) -> Self {
        let mut result = Self::EMPTY;
        for &dock in docks {
            result.set_dock_occupied(dock);
        }
        result
    }

    pub fn set_dock_occupied(&mut self, dock: Dock) {
        self.docks_preset |= 1 << dock.index();
    }

    pub fn is_dock_occupied(&self, dock: Dock) -> bool {
        self.docks_preset & (1 << dock.index()) != 0
    }

    /// Number of occupied docks.
    pub fn discovered_num(&self) -> u32 {
        self.docks_preset.count_ones()
    }

    /// True when every dock required by `minimal` is occupied here.
    pub fn satisfies(&self, minimal: BootstrapResult) -> bool {
        self.docks_preset & minimal.docks_preset == minimal.docks_preset
    }

    /// First dock required by `minimal` but absent here, in scan order.
    pub fn first_missing(&self, minimal: BootstrapResult) -> Option<Dock> {
        Dock::ALL
            .into_iter()
            .find(|&dock| minimal.is_dock_occupied(dock) && !self.is_dock_occupied(dock))
    }

    pub fn occupied_docks(&self) -> impl Iterator<Item = Dock> + '_ {
        Dock::ALL
            .into_iter()
            .filter(move |&dock| self.is_dock_occupied(dock))
    }
}

const _: () = assert!(DOCK_COUNT <= u8::BITS as usize);


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(500))]

        #[test]
        fn prop_popcount_matches_discovered_num(mask in 0u8..=0x7F) {
            let result = BootstrapResult { docks_preset: mask };
            prop_assert_eq!(result.discovered_num(), mask.count_ones());
        }

        #[test]
        fn prop_satisfies_iff_no_dock_missing(found in 0u8..=0x7F, minimal in 0u8..=0x7F) {
            let found = BootstrapResult { docks_preset: found };
            let minimal = BootstrapResult { docks_preset: minimal };
            prop_assert_eq!(found.satisfies(minimal), found.first_missing(minimal).is_none());
        }
    }
}
