//! Static permission gate and auto-exchange preferences

use crate::core::traits::{AutoExchangePreferences, Initiator, PermissionGate};
use crate::types::{LocationId, PartyId};
use dashmap::DashSet;

/// Fixed set of administrators allowed to transfer any location
///
/// The console is always allowed.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    admins: DashSet<PartyId>,
}

impl StaticPermissions {
    pub fn new(admins: impl IntoIterator<Item = PartyId>) -> Self {
        let set = DashSet::new();
        for admin in admins {
            set.insert(admin);
        }
        StaticPermissions { admins: set }
    }

    pub fn grant(&self, party: PartyId) {
        self.admins.insert(party);
    }
}

impl PermissionGate for StaticPermissions {
    fn can_transfer_ownership(&self, initiator: Initiator, _location: LocationId) -> bool {
        match initiator {
            Initiator::Console => true,
            Initiator::Party(party) => self.admins.contains(&party),
        }
    }
}

/// Auto-exchange is on for everyone except the parties that opted out
#[derive(Debug, Default)]
pub struct AutoExchangeOptOut {
    disabled: DashSet<PartyId>,
}

impl AutoExchangeOptOut {
    pub fn new() -> Self {
        AutoExchangeOptOut::default()
    }

    pub fn set_enabled(&self, party: PartyId, enabled: bool) {
        if enabled {
            self.disabled.remove(&party);
        } else {
            self.disabled.insert(party);
        }
    }
}

impl AutoExchangePreferences for AutoExchangeOptOut {
    fn is_enabled(&self, party: PartyId) -> bool {
        !self.disabled.contains(&party)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::console(Initiator::Console, true)]
    #[case::admin(Initiator::Party(9), true)]
    #[case::player(Initiator::Party(1), false)]
    fn test_transfer_permission(#[case] initiator: Initiator, #[case] allowed: bool) {
        let gate = StaticPermissions::new([9]);
        assert_eq!(gate.can_transfer_ownership(initiator, 4), allowed);
    }

    #[test]
    fn test_opt_out_toggles() {
        let prefs = AutoExchangeOptOut::new();
        assert!(prefs.is_enabled(1));

        prefs.set_enabled(1, false);
        assert!(!prefs.is_enabled(1));
        assert!(prefs.is_enabled(2));

        prefs.set_enabled(1, true);
        assert!(prefs.is_enabled(1));
    }
}
