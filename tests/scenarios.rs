use anyhow::Context;
use decision_approval::{
    Action, Actor, Amount, AuditMetadata, AuthorityBodyType, AuthorityRule, Classification,
    DecisionDraft, DecisionFilter, DecisionService, DecisionStatus, EngineConfig,
    InMemoryDirectory, ReasonCode, TrailOrder, WorkflowError,
};
use serde_json::json;
use std::sync::{Arc, Barrier};
use tempfile::{TempDir, tempdir}; // Use for test db cleanup.

const CLERK: &str = "user_clerk";
const MANAGER: &str = "user_manager";
const COMMITTEE: &str = "user_committee";
const RETIRED: &str = "user_retired";

type Service = DecisionService<Arc<InMemoryDirectory>>;

struct Fixture {
    service: Service,
    directory: Arc<InMemoryDirectory>,
    // dropped last so the db files outlive the service
    _temp_dir: TempDir,
}

fn credit() -> Classification {
    Classification::new("loan_sanction", "credit")
}

// Sled uses file-based locking, so every test gets its own database in a
// temp dir for simplified cleanup.
fn setup(db_name: &str) -> anyhow::Result<Fixture> {
    let temp_dir = tempdir()?;
    let mut config = EngineConfig::default();
    config.store.path = temp_dir.path().join(db_name);

    let directory = Arc::new(InMemoryDirectory::new());
    directory.insert(Actor::new(CLERK, AuthorityBodyType::Role, "clerk"))?;
    directory.insert(Actor::new(MANAGER, AuthorityBodyType::Role, "branch_manager"))?;
    directory.insert(Actor::new(
        COMMITTEE,
        AuthorityBodyType::Committee,
        "credit_committee",
    ))?;
    directory.insert(
        Actor::new(RETIRED, AuthorityBodyType::Role, "branch_manager").set_active(false),
    )?;

    let service = DecisionService::open(&config, directory.clone())?;

    // two rung ladder: the branch manager signs up to 1 lakh, the committee above
    service.rules().put_rule(
        AuthorityRule::new("rule_a", AuthorityBodyType::Role, "branch_manager", credit())
            .set_limits(Some(0), Some(100_000))
            .set_escalation_mandatory(true),
    )?;
    service.rules().put_rule(
        AuthorityRule::new(
            "rule_b",
            AuthorityBodyType::Committee,
            "credit_committee",
            credit(),
        )
        .set_limits(Some(100_001), Some(1_000_000)),
    )?;

    Ok(Fixture {
        service,
        directory,
        _temp_dir: temp_dir,
    })
}

fn draft(amount: u64) -> DecisionDraft {
    DecisionDraft::new()
        .set_initiator(CLERK)
        .set_outcome(json!({ "amount": amount, "purpose": "working capital" }))
        .set_dept_context("dept_retail")
        .set_region_context("region_north")
        .set_decision_type("loan_sanction")
        .set_functional_scope("credit")
}

fn act(service: &Service, id: &str, actor: &str, action: Action) -> Result<DecisionStatus, WorkflowError> {
    service
        .perform_action(id, actor, action, AuditMetadata::new())
        .map(|d| d.status())
}

#[test]
fn submit_and_approve_round_trip() -> anyhow::Result<()> {
    let fx = setup("round_trip.db")?;
    let service = &fx.service;

    let decision = service.create_decision(draft(50_000))?;
    assert_eq!(decision.status(), DecisionStatus::Draft);
    assert_eq!(decision.authority_rule_id(), Some("rule_a"));
    assert!(decision.id().starts_with("decision_1"));

    act(service, decision.id(), CLERK, Action::Submit).context("Decision failed on Submit: ")?;
    let status =
        act(service, decision.id(), MANAGER, Action::Approve).context("Decision failed on Approve: ")?;
    assert_eq!(status, DecisionStatus::Approved);

    let view = service.get_decision(decision.id())?;
    assert_eq!(view.decision.status(), DecisionStatus::Approved);
    assert_eq!(view.rule.map(|r| r.id), Some("rule_a".to_string()));

    // trail is newest first by default
    let pairs: Vec<_> = view
        .trail
        .iter()
        .map(|e| (e.prev_state, e.new_state))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (DecisionStatus::PendingApproval, DecisionStatus::Approved),
            (DecisionStatus::Draft, DecisionStatus::PendingApproval),
        ]
    );
    assert_eq!(view.trail[0].actor_id, MANAGER);
    assert_eq!(view.trail[1].actor_id, CLERK);

    Ok(())
}

#[test]
fn approve_on_draft_is_a_state_conflict() -> anyhow::Result<()> {
    let fx = setup("approve_on_draft.db")?;
    let service = &fx.service;

    let decision = service.create_decision(draft(50_000))?;
    let err = act(service, decision.id(), MANAGER, Action::Approve).unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::StateConflict {
            state: DecisionStatus::Draft,
            action: Action::Approve
        }
    ));
    assert_eq!(err.code(), "STATE_CONFLICT");

    let view = service.get_decision(decision.id())?;
    assert!(view.trail.is_empty());
    assert_eq!(view.decision, decision);

    Ok(())
}

#[test]
fn query_respond_then_approve() -> anyhow::Result<()> {
    let fx = setup("query_respond.db")?;
    let service = &fx.service;

    let decision = service.create_decision(draft(80_000))?;
    act(service, decision.id(), CLERK, Action::Submit)?;
    let before = service.get_decision(decision.id())?.trail.len();

    assert_eq!(
        act(service, decision.id(), MANAGER, Action::Query)?,
        DecisionStatus::QueryRaised
    );
    assert_eq!(
        act(service, decision.id(), CLERK, Action::Respond)?,
        DecisionStatus::PendingApproval
    );
    assert_eq!(
        act(service, decision.id(), MANAGER, Action::Approve)?,
        DecisionStatus::Approved
    );

    let view = service.get_decision(decision.id())?;
    assert_eq!(view.trail.len() - before, 3);
    let actions: Vec<_> = view.trail.iter().take(3).map(|e| e.action_type).collect();
    assert_eq!(actions, vec![Action::Approve, Action::Respond, Action::Query]);

    Ok(())
}

#[test]
fn concurrent_approvals_only_one_wins() -> anyhow::Result<()> {
    let fx = setup("concurrent.db")?;
    let service = &fx.service;

    let decision = service.create_decision(draft(10_000))?;
    act(service, decision.id(), CLERK, Action::Submit)?;

    let barrier = &Barrier::new(2);
    let id = decision.id();
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(move || {
                    barrier.wait();
                    act(service, id, MANAGER, Action::Approve)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("approval thread panicked"))
            .collect()
    });

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    let loser = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(
        loser,
        WorkflowError::StateConflict {
            state: DecisionStatus::Approved,
            action: Action::Approve
        }
    ));

    let view = service.get_decision(decision.id())?;
    assert_eq!(view.decision.status(), DecisionStatus::Approved);
    let approvals = view
        .trail
        .iter()
        .filter(|e| e.action_type == Action::Approve)
        .count();
    assert_eq!(approvals, 1);

    Ok(())
}

#[test]
fn approval_over_limit_is_forbidden_and_escalates() -> anyhow::Result<()> {
    let fx = setup("over_limit.db")?;
    let service = &fx.service;

    let decision = service.create_decision(draft(500_000))?;
    assert_eq!(decision.authority_rule_id(), Some("rule_b"));
    act(service, decision.id(), CLERK, Action::Submit)?;

    let err = act(service, decision.id(), MANAGER, Action::Approve).unwrap_err();
    assert_eq!(err.reason(), Some(ReasonCode::ExceedsLimit));
    assert!(err.to_string().contains("exceeds authority limit of 100000"));
    assert!(matches!(
        err,
        WorkflowError::Forbidden {
            escalation_required: true,
            ..
        }
    ));

    // nothing moved
    let view = service.get_decision(decision.id())?;
    assert_eq!(view.decision.status(), DecisionStatus::PendingApproval);
    assert_eq!(view.trail.len(), 1);

    // the manager forwards it, and the escalated record is closed for good
    assert_eq!(
        act(service, decision.id(), MANAGER, Action::Escalate)?,
        DecisionStatus::Escalated
    );
    for action in Action::ALL {
        let err = act(service, decision.id(), COMMITTEE, action).unwrap_err();
        assert_eq!(err.code(), "STATE_CONFLICT", "{action}");
    }

    let successor = service.create_successor(decision.id(), COMMITTEE)?;
    assert_eq!(successor.status(), DecisionStatus::Draft);
    assert_eq!(successor.parent_decision_id(), Some(decision.id()));
    assert_eq!(successor.amount(), Amount::from(500_000));
    assert_eq!(successor.authority_rule_id(), Some("rule_b"));

    act(service, successor.id(), COMMITTEE, Action::Submit)?;
    assert_eq!(
        act(service, successor.id(), COMMITTEE, Action::Approve)?,
        DecisionStatus::Approved
    );

    Ok(())
}

#[test]
fn successor_requires_escalated_parent() -> anyhow::Result<()> {
    let fx = setup("successor_guard.db")?;
    let service = &fx.service;

    let decision = service.create_decision(draft(500))?;
    let err = service.create_successor(decision.id(), MANAGER).unwrap_err();
    assert_eq!(err.code(), "VALIDATION");

    Ok(())
}

#[test]
fn wrong_band_and_missing_rule_are_forbidden() -> anyhow::Result<()> {
    let fx = setup("wrong_band.db")?;
    let service = &fx.service;

    let decision = service.create_decision(draft(50_000))?;
    act(service, decision.id(), CLERK, Action::Submit)?;

    // the committee's floor sits above a small loan
    let err = act(service, decision.id(), COMMITTEE, Action::Approve).unwrap_err();
    assert_eq!(err.reason(), Some(ReasonCode::BelowMin));

    // clerks hold no approval rule at all
    let err = act(service, decision.id(), CLERK, Action::Approve).unwrap_err();
    assert_eq!(err.reason(), Some(ReasonCode::NoRule));
    assert_eq!(err.code(), "FORBIDDEN");

    assert_eq!(service.get_decision(decision.id())?.trail.len(), 1);

    Ok(())
}

#[test]
fn inactive_actor_is_forbidden() -> anyhow::Result<()> {
    let fx = setup("inactive.db")?;
    let service = &fx.service;

    let decision = service.create_decision(draft(50_000))?;
    act(service, decision.id(), CLERK, Action::Submit)?;

    let err = act(service, decision.id(), RETIRED, Action::Approve).unwrap_err();
    assert_eq!(err.reason(), Some(ReasonCode::InactiveActor));

    // a tenure ending mid-flow takes effect on the next call
    fx.directory.set_active(MANAGER, false)?;
    let err = act(service, decision.id(), MANAGER, Action::Reject).unwrap_err();
    assert_eq!(err.reason(), Some(ReasonCode::InactiveActor));

    let view = service.get_decision(decision.id())?;
    assert_eq!(view.decision.status(), DecisionStatus::PendingApproval);
    assert_eq!(view.trail.len(), 1);

    // inactive initiators cannot open decisions either
    let err = service
        .create_decision(draft(10).set_initiator(RETIRED))
        .unwrap_err();
    assert_eq!(err.reason(), Some(ReasonCode::InactiveActor));

    Ok(())
}

#[test]
fn unknown_references_and_missing_actor() -> anyhow::Result<()> {
    let fx = setup("unknown_refs.db")?;
    let service = &fx.service;

    let err = act(service, "decision_missing", MANAGER, Action::Submit).unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { kind: "decision", .. }));
    assert!(matches!(
        service.get_decision("decision_missing"),
        Err(WorkflowError::NotFound { .. })
    ));

    let decision = service.create_decision(draft(10))?;
    let err = act(service, decision.id(), "user_nobody", Action::Submit).unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { kind: "actor", .. }));

    // no implicit actor is ever substituted
    let err = act(service, decision.id(), "", Action::Submit).unwrap_err();
    assert_eq!(err.code(), "VALIDATION");

    let err = service
        .create_decision(draft(10).set_outcome(json!({ "amount": "a lot" })))
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION");

    Ok(())
}

#[test]
fn uncovered_or_unclassified_amounts_skip_limit_check() -> anyhow::Result<()> {
    let fx = setup("uncovered.db")?;
    let service = &fx.service;

    // beyond every configured band: no rule is pinned
    let huge = service.create_decision(draft(2_000_000))?;
    assert_eq!(huge.authority_rule_id(), None);
    act(service, huge.id(), CLERK, Action::Submit)?;
    assert_eq!(
        act(service, huge.id(), CLERK, Action::Approve)?,
        DecisionStatus::Approved
    );

    let plain = service.create_decision(
        DecisionDraft::new()
            .set_initiator(CLERK)
            .set_outcome(json!({ "title": "annual leave policy" }))
            .set_dept_context("dept_hr")
            .set_region_context("region_north"),
    )?;
    assert_eq!(plain.classification(), None);
    assert_eq!(plain.amount(), Amount::ZERO);
    assert!(service.get_decision(plain.id())?.rule.is_none());

    Ok(())
}

#[test]
fn fractional_amounts_are_checked_exactly() -> anyhow::Result<()> {
    let fx = setup("fractional.db")?;
    let service = &fx.service;

    let within = service.create_decision(
        draft(0).set_outcome(json!({ "amount": 99999.99, "purpose": "equipment" })),
    )?;
    assert_eq!(within.amount(), "99999.99".parse::<Amount>()?);
    assert_eq!(within.authority_rule_id(), Some("rule_a"));
    act(service, within.id(), CLERK, Action::Submit)?;
    assert_eq!(
        act(service, within.id(), MANAGER, Action::Approve)?,
        DecisionStatus::Approved
    );

    // half a unit over the manager's limit lands on the committee's side
    let over = service.create_decision(
        draft(0).set_outcome(json!({ "amount": "100001.50" })),
    )?;
    assert_eq!(over.authority_rule_id(), Some("rule_b"));
    act(service, over.id(), CLERK, Action::Submit)?;
    let err = act(service, over.id(), MANAGER, Action::Approve).unwrap_err();
    assert_eq!(err.reason(), Some(ReasonCode::ExceedsLimit));
    assert!(err.to_string().contains("amount 100001.5 exceeds authority limit of 100000"));

    // the amount survives the store unchanged
    let view = service.get_decision(over.id())?;
    assert_eq!(view.decision.amount(), "100001.5".parse::<Amount>()?);

    Ok(())
}

#[test]
fn sanction_reject_and_escalate_paths() -> anyhow::Result<()> {
    let fx = setup("other_paths.db")?;
    let service = &fx.service;

    let sanctioned = service.create_decision(draft(1_000))?;
    act(service, sanctioned.id(), CLERK, Action::Submit)?;
    assert_eq!(
        act(service, sanctioned.id(), MANAGER, Action::Sanction)?,
        DecisionStatus::Sanctioned
    );

    let rejected = service.create_decision(draft(1_000))?;
    act(service, rejected.id(), CLERK, Action::Submit)?;
    act(service, rejected.id(), MANAGER, Action::Query)?;
    assert_eq!(
        act(service, rejected.id(), MANAGER, Action::Reject)?,
        DecisionStatus::Rejected
    );

    let escalated = service.create_decision(draft(1_000))?;
    assert_eq!(
        act(service, escalated.id(), CLERK, Action::Escalate)?,
        DecisionStatus::Escalated
    );

    // terminal decisions never move again
    for id in [sanctioned.id(), rejected.id()] {
        for action in Action::ALL {
            assert_eq!(
                act(service, id, MANAGER, action).unwrap_err().code(),
                "STATE_CONFLICT"
            );
        }
    }

    Ok(())
}

#[test]
fn audit_entries_keep_notes_and_evidence() -> anyhow::Result<()> {
    let fx = setup("audit_metadata.db")?;
    let service = &fx.service;

    let decision = service.create_decision(draft(7_500))?;
    service.perform_action(
        decision.id(),
        CLERK,
        Action::Submit,
        AuditMetadata::new()
            .set_notes("please review before month end")
            .add_evidence("doc://appraisal/123")
            .add_evidence("doc://kyc/456"),
    )?;
    act(service, decision.id(), MANAGER, Action::Approve)?;

    let trail = service
        .audit()
        .trail(decision.id(), TrailOrder::Ascending)?;
    assert_eq!(trail.len(), 2);
    assert_eq!(
        trail[0].metadata.notes.as_deref(),
        Some("please review before month end")
    );
    assert_eq!(trail[0].metadata.evidence_refs.len(), 2);
    assert_eq!(trail[0].seq, 0);
    assert_eq!(trail[1].seq, 1);
    assert!(trail[0].timestamp <= trail[1].timestamp);
    assert_eq!(trail[1].prev_hash, Some(trail[0].digest()?));

    let report = service.verify_trail(decision.id())?;
    assert!(report.is_intact());
    assert_eq!(report.entries, 2);

    Ok(())
}

#[test]
fn list_decisions_by_filter() -> anyhow::Result<()> {
    let fx = setup("listing.db")?;
    let service = &fx.service;

    let first = service.create_decision(draft(100))?;
    let second = service.create_decision(draft(200).set_dept_context("dept_corporate"))?;
    let third = service.create_decision(
        DecisionDraft::new()
            .set_initiator(MANAGER)
            .set_outcome(json!({ "amount": 300 }))
            .set_dept_context("dept_retail")
            .set_region_context("region_south"),
    )?;
    act(service, second.id(), CLERK, Action::Submit)?;

    let all = service.list_decisions(&DecisionFilter::new())?;
    let ids: Vec<_> = all.iter().map(|d| d.id().to_string()).collect();
    assert_eq!(ids, vec![first.id(), second.id(), third.id()]);

    let pending =
        service.list_decisions(&DecisionFilter::new().with_status(DecisionStatus::PendingApproval))?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id(), second.id());

    let retail = service.list_decisions(&DecisionFilter::new().with_dept_context("dept_retail"))?;
    assert_eq!(retail.len(), 2);

    let by_manager = service.list_decisions(&DecisionFilter::new().with_initiator(MANAGER))?;
    assert_eq!(by_manager.len(), 1);

    let credit_loans = service.list_decisions(
        &DecisionFilter::new()
            .with_decision_type("loan_sanction")
            .with_functional_scope("credit"),
    )?;
    assert_eq!(credit_loans.len(), 2);

    Ok(())
}

#[test]
fn decisions_survive_reopen() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let mut config = EngineConfig::default();
    config.store.path = temp_dir.path().join("reopen.db");
    let directory = Arc::new(InMemoryDirectory::new());
    directory.insert(Actor::new(CLERK, AuthorityBodyType::Role, "clerk"))?;

    let id = {
        let service = DecisionService::open(&config, directory.clone())?;
        let decision = service.create_decision(
            DecisionDraft::new()
                .set_initiator(CLERK)
                .set_outcome(json!({ "amount": 5 }))
                .set_dept_context("dept")
                .set_region_context("region"),
        )?;
        act(&service, decision.id(), CLERK, Action::Submit)?;
        service.flush()?;
        decision.id().to_string()
    };

    let service = DecisionService::open(&config, directory)?;
    let view = service.get_decision(&id)?;
    assert_eq!(view.decision.status(), DecisionStatus::PendingApproval);
    assert_eq!(view.trail.len(), 1);
    assert!(service.verify_trail(&id)?.is_intact());

    Ok(())
}
