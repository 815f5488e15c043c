//! Subscription matching: which participants want a published payload.
//!
//! Everything here is a pure function over its arguments. It runs on the
//! task-completion hot path, so the rules are evaluated in a fixed order and
//! stop at the first failing rule.

mod wildcard;

pub use wildcard::descriptor_matches;

use std::collections::BTreeSet;

use crate::domain::{
    FlowDirection, Manifest, ParticipantFilter, ParticipantName, ParticipantRef,
    ParticipantRegistration, Subscription, WILDCARD,
};

/// Whether `manifest` passes every rule of `subscription`.
pub fn matches(manifest: &Manifest, subscription: &Subscription) -> bool {
    direction_matches(manifest, subscription)
        && content_matches(manifest, subscription)
        && subscription.normalisation.accepts(&manifest.normalisation)
        && validation_matches(manifest, subscription)
        && manifest.parcel_type == subscription.parcel_type
        && system_matches(
            subscription.source_system.as_deref(),
            manifest.source_system.as_deref(),
        )
        && system_matches(
            subscription.target_system.as_deref(),
            manifest.target_system.as_deref(),
        )
        && subscription.policy.accepts(&manifest.policy)
        && manifest.distributable == subscription.distributable
        && participant_matches(subscription.origin.as_ref(), manifest.origin.as_ref())
        && participant_matches(subscription.previous.as_ref(), manifest.previous.as_ref())
}

/// Enabled participants holding at least one matching subscription.
///
/// A participant appears once no matter how many of its subscriptions match.
pub fn subscribers(
    manifest: &Manifest,
    registrations: &[ParticipantRegistration],
) -> BTreeSet<ParticipantName> {
    registrations
        .iter()
        .filter(|r| r.enabled)
        .filter(|r| r.subscriptions.iter().any(|s| matches(manifest, s)))
        .map(|r| r.name.clone())
        .collect()
}

// Rule 1: fan-out only happens in the core distribution direction.
fn direction_matches(manifest: &Manifest, subscription: &Subscription) -> bool {
    manifest.direction == subscription.direction
        && manifest.direction == FlowDirection::CoreDistribution
}

// Rule 2: exact match, or container-only match for whole-container subscriptions.
fn content_matches(manifest: &Manifest, subscription: &Subscription) -> bool {
    if !descriptor_matches(&subscription.container, &manifest.container) {
        return false;
    }
    if subscription.is_container_only() {
        return true;
    }
    match (&subscription.content, &manifest.content) {
        (Some(wanted), Some(published)) => descriptor_matches(wanted, published),
        (Some(wanted), None) => wanted == WILDCARD,
        (None, _) => true,
    }
}

// Rule 4: both unspecified counts as a match.
fn validation_matches(manifest: &Manifest, subscription: &Subscription) -> bool {
    match (&subscription.validation, &manifest.validation) {
        (None, None) => true,
        (Some(filter), Some(status)) => filter.accepts(status),
        (Some(filter), None) => *filter == crate::domain::StatusFilter::Any,
        (None, Some(_)) => false,
    }
}

// Rules 6 and 7.
fn system_matches(filter: Option<&str>, published: Option<&str>) -> bool {
    match (filter, published) {
        (Some(WILDCARD), _) => true,
        (None, None) => true,
        (Some(wanted), Some(actual)) => wanted == actual,
        _ => false,
    }
}

// Rules 10 and 11. An all-wildcard filter also accepts an unspecified participant.
fn participant_matches(filter: Option<&ParticipantFilter>, published: Option<&ParticipantRef>) -> bool {
    match (filter, published) {
        (None, None) => true,
        (Some(f), Some(p)) => f.accepts(p),
        (Some(f), None) => f.is_any(),
        (None, Some(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        NormalisationStatus, ParcelType, PolicyApproval, StatusFilter, ValidationStatus,
    };
    use rstest::rstest;

    fn invoice() -> Manifest {
        Manifest::core("Order").with_content("Invoice")
    }

    fn fully_specified() -> Manifest {
        Manifest::core("Order")
            .with_content("Invoice.Draft")
            .with_validation(ValidationStatus::Valid)
            .with_systems(Some("erp"), Some("ledger"))
            .with_origin(ParticipantRef::new("Intake", "orders", "3"))
            .with_previous(ParticipantRef::new("Enricher", "orders", "1"))
    }

    #[test]
    fn wildcard_subscription_matches_any_core_manifest() {
        let all = Subscription::wildcard();
        for m in [
            invoice(),
            fully_specified(),
            Manifest::core("Shipment"),
            Manifest::core("Order").with_validation(ValidationStatus::Invalid),
        ] {
            assert!(matches(&m, &all), "{m:?}");
        }
    }

    #[rstest]
    #[case::ingest(FlowDirection::Ingest, FlowDirection::CoreDistribution)]
    #[case::export(FlowDirection::CoreDistribution, FlowDirection::Export)]
    #[case::both_other(FlowDirection::Ingest, FlowDirection::Ingest)]
    fn direction_law(#[case] published: FlowDirection, #[case] wanted: FlowDirection) {
        let m = invoice().with_direction(published);
        let s = Subscription::wildcard().with_direction(wanted);
        assert!(!matches(&m, &s));
    }

    #[test]
    fn container_only_subscription_ignores_content() {
        let s = Subscription::to_container("Order");
        assert!(matches(&invoice(), &s));
        assert!(matches(&Manifest::core("Order").with_content("CreditNote"), &s));
        assert!(matches(&Manifest::core("Order"), &s));
        assert!(!matches(&Manifest::core("Shipment"), &s));
    }

    #[test]
    fn distinct_content_descriptor_uses_exact_rule() {
        let s = Subscription::to_container("Order").with_content("Invoice");
        assert!(matches(&invoice(), &s));
        assert!(!matches(&Manifest::core("Order").with_content("CreditNote"), &s));
        assert!(!matches(&Manifest::core("Order"), &s));
    }

    #[test]
    fn content_wildcard_segment() {
        let s = Subscription::to_container("Order").with_content("Invoice.*");
        assert!(matches(&fully_specified(), &s));
        assert!(!matches(&invoice(), &s));
    }

    #[rstest]
    #[case::any(StatusFilter::Any, true)]
    #[case::same(StatusFilter::Is(NormalisationStatus::Normalised), true)]
    #[case::different(StatusFilter::Is(NormalisationStatus::Raw), false)]
    fn normalisation_rule(
        #[case] filter: StatusFilter<NormalisationStatus>,
        #[case] expected: bool,
    ) {
        let s = Subscription::to_container("Order").with_normalisation(filter);
        assert_eq!(matches(&invoice(), &s), expected);
    }

    #[rstest]
    #[case::both_none(None, None, true)]
    #[case::any_vs_none(Some(StatusFilter::Any), None, true)]
    #[case::none_vs_some(None, Some(ValidationStatus::Valid), false)]
    #[case::equal(Some(StatusFilter::Is(ValidationStatus::Valid)), Some(ValidationStatus::Valid), true)]
    #[case::differ(Some(StatusFilter::Is(ValidationStatus::Valid)), Some(ValidationStatus::Invalid), false)]
    #[case::wanted_missing(Some(StatusFilter::Is(ValidationStatus::Valid)), None, false)]
    fn validation_rule(
        #[case] filter: Option<StatusFilter<ValidationStatus>>,
        #[case] published: Option<ValidationStatus>,
        #[case] expected: bool,
    ) {
        let mut m = invoice();
        m.validation = published;
        let s = Subscription::to_container("Order").with_validation(filter);
        assert_eq!(matches(&m, &s), expected);
    }

    #[test]
    fn parcel_type_must_be_equal() {
        let mut m = invoice();
        m.parcel_type = ParcelType::Batch;
        assert!(!matches(&m, &Subscription::wildcard()));
    }

    #[rstest]
    #[case::wildcard(Some("*"), Some("erp"), true)]
    #[case::wildcard_vs_none(Some("*"), None, true)]
    #[case::neither(None, None, true)]
    #[case::equal(Some("erp"), Some("erp"), true)]
    #[case::differ(Some("erp"), Some("crm"), false)]
    #[case::wanted_missing(Some("erp"), None, false)]
    #[case::unfiltered_vs_some(None, Some("erp"), false)]
    fn system_rule(
        #[case] filter: Option<&str>,
        #[case] published: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(system_matches(filter, published), expected);
        let m = invoice().with_systems(published, None);
        let s = Subscription::to_container("Order").with_systems(filter, Some("*"));
        assert_eq!(matches(&m, &s), expected);
    }

    #[test]
    fn policy_rule() {
        let mut m = invoice();
        m.policy = PolicyApproval::Pending;
        let strict = Subscription::to_container("Order")
            .with_policy(StatusFilter::Is(PolicyApproval::Approved));
        assert!(!matches(&m, &strict));
        assert!(matches(&m, &Subscription::to_container("Order")));
    }

    #[test]
    fn distributable_must_be_equal() {
        let mut m = invoice();
        m.distributable = false;
        assert!(!matches(&m, &Subscription::to_container("Order")));
    }

    #[test]
    fn origin_and_previous_filters() {
        let m = fully_specified();
        let by_origin = Subscription::to_container("Order")
            .with_origin(Some(ParticipantFilter::new("Intake", "*", "*")));
        assert!(matches(&m, &by_origin));

        let wrong_version = Subscription::to_container("Order")
            .with_origin(Some(ParticipantFilter::new("Intake", "orders", "2")));
        assert!(!matches(&m, &wrong_version));

        let by_previous = Subscription::to_container("Order")
            .with_previous(Some(ParticipantFilter::new("Enricher", "orders", "*")));
        assert!(matches(&m, &by_previous));

        let unfiltered = Subscription::to_container("Order").with_origin(None);
        assert!(!matches(&m, &unfiltered));
        assert!(matches(&invoice(), &unfiltered));
    }

    #[test]
    fn concrete_origin_filter_needs_an_origin() {
        let s = Subscription::to_container("Order")
            .with_origin(Some(ParticipantFilter::new("Intake", "*", "*")));
        assert!(!matches(&invoice(), &s));
    }

    #[test]
    fn subscribers_dedupes_and_skips_disabled() {
        let regs = vec![
            ParticipantRegistration::new(
                "Billing",
                vec![
                    Subscription::to_container("Order"),
                    Subscription::to_container("Order").with_content("Invoice"),
                ],
            ),
            ParticipantRegistration::new("Audit", vec![Subscription::wildcard()]).disabled(),
            ParticipantRegistration::new("Shipping", vec![Subscription::to_container("Shipment")]),
        ];
        let found = subscribers(&invoice(), &regs);
        assert_eq!(found, BTreeSet::from([ParticipantName::new("Billing")]));
    }
}
