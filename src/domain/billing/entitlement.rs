//! Entitlement groups derived from subscription status.
//!
//! # Design
//!
//! - `entitlement_for` is a pure mapping from status to the desired change
//! - `resolve_groups` applies that change to a group set without touching
//!   groups this module does not own
//! - `paidMembers` and `trialMembers` never coexist in a resolved set

use std::collections::BTreeSet;
use std::fmt;

use super::status::ChargeStatus;

/// Groups owned by the entitlement resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntitlementGroup {
    PaidMembers,
    TrialMembers,
}

impl EntitlementGroup {
    pub const ALL: [EntitlementGroup; 2] =
        [EntitlementGroup::PaidMembers, EntitlementGroup::TrialMembers];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementGroup::PaidMembers => "paidMembers",
            EntitlementGroup::TrialMembers => "trialMembers",
        }
    }
}

impl fmt::Display for EntitlementGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a status asks of the user's groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entitlement {
    /// Hold exactly this entitlement group.
    Grant(EntitlementGroup),
    /// Leave groups as they are.
    Unchanged,
    /// Hold no entitlement group.
    Revoke,
}

/// Maps a charge status to the desired entitlement.
///
/// `canceled` keeps whatever the user has: access runs until the period end
/// and is withdrawn by the expiration check, not here.
pub fn entitlement_for(status: &ChargeStatus) -> Entitlement {
    match status {
        ChargeStatus::Active => Entitlement::Grant(EntitlementGroup::PaidMembers),
        ChargeStatus::Trialing => Entitlement::Grant(EntitlementGroup::TrialMembers),
        ChargeStatus::Canceled => Entitlement::Unchanged,
        _ => Entitlement::Revoke,
    }
}

/// Computes the group set after applying an entitlement.
pub fn resolve_groups(current: &BTreeSet<String>, entitlement: Entitlement) -> BTreeSet<String> {
    let desired = match entitlement {
        Entitlement::Unchanged => return current.clone(),
        Entitlement::Grant(group) => Some(group),
        Entitlement::Revoke => None,
    };

    let mut groups: BTreeSet<String> = current
        .iter()
        .filter(|g| !EntitlementGroup::ALL.iter().any(|owned| owned.as_str() == g.as_str()))
        .cloned()
        .collect();

    if let Some(group) = desired {
        groups.insert(group.as_str().to_string());
    }

    groups
}

/// True if the group set grants premium access.
pub fn grants_access(groups: &BTreeSet<String>) -> bool {
    EntitlementGroup::ALL
        .iter()
        .any(|group| groups.contains(group.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn groups(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn active_grants_paid_members() {
        assert_eq!(
            entitlement_for(&ChargeStatus::Active),
            Entitlement::Grant(EntitlementGroup::PaidMembers)
        );
    }

    #[test]
    fn trialing_grants_trial_members() {
        assert_eq!(
            entitlement_for(&ChargeStatus::Trialing),
            Entitlement::Grant(EntitlementGroup::TrialMembers)
        );
    }

    #[test]
    fn canceled_leaves_groups_unchanged() {
        assert_eq!(entitlement_for(&ChargeStatus::Canceled), Entitlement::Unchanged);

        let current = groups(&["paidMembers", "admins"]);
        assert_eq!(resolve_groups(&current, Entitlement::Unchanged), current);
    }

    #[test]
    fn other_statuses_revoke() {
        for status in [
            ChargeStatus::Incomplete,
            ChargeStatus::PastDue,
            ChargeStatus::Expired,
            ChargeStatus::Unpaid,
            ChargeStatus::Other("weird".to_string()),
        ] {
            assert_eq!(entitlement_for(&status), Entitlement::Revoke);
        }
    }

    #[test]
    fn granting_paid_removes_trial() {
        let current = groups(&["trialMembers", "admins"]);
        let resolved = resolve_groups(&current, Entitlement::Grant(EntitlementGroup::PaidMembers));
        assert_eq!(resolved, groups(&["admins", "paidMembers"]));
    }

    #[test]
    fn revoke_keeps_unrelated_groups() {
        let current = groups(&["paidMembers", "editors"]);
        assert_eq!(resolve_groups(&current, Entitlement::Revoke), groups(&["editors"]));
    }

    #[test]
    fn grants_access_requires_an_entitlement_group() {
        assert!(grants_access(&groups(&["paidMembers"])));
        assert!(grants_access(&groups(&["trialMembers"])));
        assert!(!grants_access(&groups(&["admins"])));
    }

    fn any_status() -> impl Strategy<Value = ChargeStatus> {
        prop_oneof![
            Just(ChargeStatus::Active),
            Just(ChargeStatus::Trialing),
            Just(ChargeStatus::Incomplete),
            Just(ChargeStatus::PastDue),
            Just(ChargeStatus::Canceled),
            Just(ChargeStatus::Expired),
        ]
    }

    fn any_groups() -> impl Strategy<Value = BTreeSet<String>> {
        proptest::collection::btree_set(
            prop_oneof![
                Just("paidMembers".to_string()),
                Just("trialMembers".to_string()),
                Just("admins".to_string()),
                "[a-z]{1,8}",
            ],
            0..5,
        )
    }

    proptest! {
        #[test]
        fn applying_twice_equals_applying_once(current in any_groups(), status in any_status()) {
            let entitlement = entitlement_for(&status);
            let once = resolve_groups(&current, entitlement);
            let twice = resolve_groups(&once, entitlement);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn at_most_one_entitlement_group_after_grant_or_revoke(
            current in any_groups(),
            status in any_status(),
        ) {
            prop_assume!(status != ChargeStatus::Canceled);
            let resolved = resolve_groups(&current, entitlement_for(&status));
            let owned = EntitlementGroup::ALL
                .iter()
                .filter(|g| resolved.contains(g.as_str()))
                .count();
            prop_assert!(owned <= 1);
        }

        #[test]
        fn unrelated_groups_are_preserved(current in any_groups(), status in any_status()) {
            let resolved = resolve_groups(&current, entitlement_for(&status));
            for group in current.iter().filter(|g| *g != "paidMembers" && *g != "trialMembers") {
                prop_assert!(resolved.contains(group));
            }
        }
    }
}
