//! Property tests for the risk assessor.

use gatekeep_core::risk::{
    Action, Context, DataClassification, Environment, Impact, RiskAssessor, RiskLevel, Scope,
};
use proptest::prelude::*;

fn environment() -> impl Strategy<Value = Environment> {
    prop_oneof![
        Just(Environment::Development),
        Just(Environment::Staging),
        Just(Environment::Production),
    ]
}

fn scope() -> impl Strategy<Value = Scope> {
    prop_oneof![
        Just(Scope::SingleUnit),
        Just(Scope::MultipleUnits),
        Just(Scope::SystemWide),
    ]
}

fn impact() -> impl Strategy<Value = Impact> {
    prop_oneof![Just(Impact::Low), Just(Impact::Medium), Just(Impact::High)]
}

fn env_rank(e: Environment) -> u8 {
    match e {
        Environment::Development => 0,
        Environment::Staging => 1,
        Environment::Production => 2,
    }
}

fn scope_rank(s: Scope) -> u8 {
    match s {
        Scope::SingleUnit => 0,
        Scope::MultipleUnits => 1,
        Scope::SystemWide => 2,
    }
}

fn impact_rank(i: Impact) -> u8 {
    match i {
        Impact::Low => 0,
        Impact::Medium => 1,
        Impact::High => 2,
    }
}

proptest! {
    #[test]
    fn assessment_is_pure(
        env in environment(),
        tier in 1u8..=4,
        scope in scope(),
        reversible in any::<bool>(),
        impact in impact(),
    ) {
        let assessor = RiskAssessor::new();
        let ctx = Context::new(env, DataClassification::new(tier).unwrap(), scope, "prop-user");
        let action = Action::new("change", "target", reversible, impact);
        let a = assessor.assess(&ctx, &action).unwrap();
        let b = assessor.assess(&ctx, &action).unwrap();
        prop_assert_eq!(a.score(), b.score());
        prop_assert_eq!(a.level(), b.level());
        prop_assert_eq!(a.factors(), b.factors());
        prop_assert_eq!(a.safeguards(), b.safeguards());
        prop_assert!(a.score() <= 100);
        prop_assert_eq!(a.level(), RiskLevel::from_score(a.score()));
    }

    #[test]
    fn score_is_monotone_in_every_input(
        env_a in environment(),
        env_b in environment(),
        tier_a in 1u8..=4,
        tier_b in 1u8..=4,
        scope_a in scope(),
        scope_b in scope(),
        impact_a in impact(),
        impact_b in impact(),
        rev_a in any::<bool>(),
        rev_b in any::<bool>(),
    ) {
        // Order each pair so `hi` dominates `lo` on every input.
        let (env_lo, env_hi) = if env_rank(env_a) <= env_rank(env_b) { (env_a, env_b) } else { (env_b, env_a) };
        let (tier_lo, tier_hi) = (tier_a.min(tier_b), tier_a.max(tier_b));
        let (scope_lo, scope_hi) = if scope_rank(scope_a) <= scope_rank(scope_b) { (scope_a, scope_b) } else { (scope_b, scope_a) };
        let (impact_lo, impact_hi) = if impact_rank(impact_a) <= impact_rank(impact_b) { (impact_a, impact_b) } else { (impact_b, impact_a) };
        let rev_lo = rev_a || rev_b;
        let rev_hi = rev_a && rev_b;

        let assessor = RiskAssessor::new();
        let lo = assessor.assess(
            &Context::new(env_lo, DataClassification::new(tier_lo).unwrap(), scope_lo, "prop-user"),
            &Action::new("change", "target", rev_lo, impact_lo),
        ).unwrap();
        let hi = assessor.assess(
            &Context::new(env_hi, DataClassification::new(tier_hi).unwrap(), scope_hi, "prop-user"),
            &Action::new("change", "target", rev_hi, impact_hi),
        ).unwrap();
        prop_assert!(lo.score() <= hi.score());
        prop_assert!(lo.level() <= hi.level());
        prop_assert!(hi.safeguards().covers(lo.safeguards()));
    }

    #[test]
    fn more_failures_never_lower_history(successes in 0usize..10, failures in 1usize..10) {
        let assessor = RiskAssessor::new();
        for _ in 0..successes {
            assessor.record_operation_result("prop-user", true);
        }
        let before = assessor.history_factor("prop-user");
        for _ in 0..failures {
            assessor.record_operation_result("prop-user", false);
        }
        let after = assessor.history_factor("prop-user");
        prop_assert!(after > before);
        prop_assert!(after <= 100);
    }
}

#[test]
fn production_restricted_irreversible_is_critical() {
    let assessor = RiskAssessor::new();
    let a = assessor
        .assess(
            &Context::new(
                Environment::Production,
                DataClassification::RESTRICTED,
                Scope::SystemWide,
                "alice",
            ),
            &Action::new("drop_table", "customers", false, Impact::High),
        )
        .unwrap();
    assert_eq!(a.score(), 90);
    assert_eq!(a.level(), RiskLevel::Critical);
    assert_eq!(a.safeguards().required_approvers, 2);
    assert!(!a.safeguards().additional_checks.is_empty());
}

#[test]
fn history_isolated_per_user() {
    let assessor = RiskAssessor::new();
    assessor.record_operation_result("alice", false);
    assert!(assessor.history_factor("alice") > 0);
    assert_eq!(assessor.history_factor("bob"), 0);
    assessor.clear_history(None);
    assert_eq!(assessor.history_factor("alice"), 0);
}
