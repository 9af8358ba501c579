//! End-to-end command runs against real temporary git repositories.
//!
//! Each test opens a [`Session`] on a fresh repository, runs one or more
//! commands, and checks refs, lineage and run state afterwards. Undo is
//! exercised right after the command it reverts.

use branchwise::compress::{CompressOptions, compress};
use branchwise::error::ValidationError;
use branchwise::hack::{append, hack};
use branchwise::io::config::load_config;
use branchwise::kill::kill;
use branchwise::session::{Session, SessionOptions};
use branchwise::ship::{ShipOptions, ship};
use branchwise::test_support::TestRepo;
use branchwise::undo::undo;
use branchwise::vm::Outcome;

fn open(repo: &TestRepo) -> Session {
    Session::open(repo.path(), &SessionOptions::default()).expect("open session")
}

/// `main` plus `feature-x` (child of main) with three commits.
fn repo_with_feature(origin: bool) -> TestRepo {
    let repo = if origin {
        TestRepo::with_origin()
    } else {
        TestRepo::new()
    }
    .expect("repo");
    let mut session = open(&repo);
    let outcome = hack(&mut session, "feature-x").expect("hack");
    assert!(matches!(outcome, Outcome::Completed));
    repo.commit_file("a.txt", "a\n", "first").expect("commit");
    repo.commit_file("b.txt", "b\n", "second").expect("commit");
    repo.commit_file("c.txt", "c\n", "third").expect("commit");
    repo
}

fn assert_validation(err: &anyhow::Error) -> &ValidationError {
    err.downcast_ref::<ValidationError>()
        .unwrap_or_else(|| panic!("expected a validation error, got: {err:#}"))
}

#[test]
fn compress_squashes_and_undo_restores_local_and_remote() {
    let repo = repo_with_feature(true);
    repo.push("feature-x").expect("push");
    let before = repo.sha("feature-x").expect("sha");

    let mut session = open(&repo);
    let outcome = compress(&mut session, &CompressOptions::default()).expect("compress");
    assert!(matches!(outcome, Outcome::Completed));
    assert_eq!(
        repo.log_subjects("main..feature-x").expect("log"),
        vec!["first".to_string()]
    );
    assert_eq!(
        repo.sha("origin/feature-x").expect("remote"),
        repo.sha("feature-x").expect("local")
    );
    assert_eq!(repo.current_branch().expect("branch"), "feature-x");
    for file in ["a.txt", "b.txt", "c.txt"] {
        assert!(repo.path().join(file).exists(), "{file} kept");
    }

    let outcome = undo(&mut open(&repo)).expect("undo");
    assert!(matches!(outcome, Outcome::Completed));
    assert_eq!(repo.sha("feature-x").expect("sha"), before);
    repo.git(&["fetch", "--quiet", "origin"]).expect("fetch");
    assert_eq!(repo.sha("origin/feature-x").expect("remote"), before);
    assert_eq!(repo.current_branch().expect("branch"), "feature-x");
}

#[test]
fn stack_compress_keeps_each_branch_on_its_parent() {
    let repo = TestRepo::new().expect("repo");
    let mut session = open(&repo);
    hack(&mut session, "team").expect("hack");
    repo.commit_file("t1.txt", "t1\n", "t 1").expect("commit");
    repo.commit_file("t2.txt", "t2\n", "t 2").expect("commit");
    append(&mut session, "feature-x").expect("append");
    repo.commit_file("x1.txt", "x1\n", "x 1").expect("commit");
    repo.commit_file("x2.txt", "x2\n", "x 2").expect("commit");

    let options = CompressOptions {
        stack: true,
        message: None,
    };
    let outcome = compress(&mut open(&repo), &options).expect("compress");
    assert!(matches!(outcome, Outcome::Completed));
    assert_eq!(
        repo.log_subjects("main..team").expect("log"),
        vec!["t 1".to_string()]
    );
    assert_eq!(
        repo.log_subjects("team..feature-x").expect("log"),
        vec!["x 1".to_string()]
    );
    repo.git(&["merge-base", "--is-ancestor", "team", "feature-x"])
        .expect("feature-x still stacked on team");
    assert_eq!(
        repo.git(&["diff", "--name-only", "team", "feature-x"])
            .expect("diff"),
        "x1.txt\nx2.txt"
    );
    assert_eq!(repo.current_branch().expect("branch"), "feature-x");
}

#[test]
fn undo_keeps_open_changes_across_the_reversal() {
    let repo = repo_with_feature(false);
    let before = repo.sha("feature-x").expect("sha");
    repo.write_file("a.txt", "a edited\n").expect("edit");
    repo.write_file("wip.txt", "wip\n").expect("untracked");

    compress(&mut open(&repo), &CompressOptions::default()).expect("compress");
    assert_eq!(
        repo.log_subjects("main..feature-x").expect("log"),
        vec!["first".to_string()]
    );

    let outcome = undo(&mut open(&repo)).expect("undo");
    assert!(matches!(outcome, Outcome::Completed));
    assert_eq!(repo.sha("feature-x").expect("sha"), before);
    assert_eq!(repo.current_branch().expect("branch"), "feature-x");
    let read = |name: &str| std::fs::read_to_string(repo.path().join(name)).expect("read");
    assert_eq!(read("a.txt"), "a edited\n");
    assert_eq!(read("wip.txt"), "wip\n");
    assert_eq!(repo.git(&["stash", "list"]).expect("stash"), "");
}

#[test]
fn compress_validation_errors_mutate_nothing() {
    let repo = TestRepo::new().expect("repo");
    let mut session = open(&repo);
    hack(&mut session, "feature-x").expect("hack");
    repo.commit_file("a.txt", "a\n", "only").expect("commit");
    let before = repo.sha("feature-x").expect("sha");

    let err = compress(&mut session, &CompressOptions::default()).expect_err("one commit");
    assert!(matches!(
        assert_validation(&err),
        ValidationError::AlreadyOneCommit { .. }
    ));
    assert_eq!(repo.sha("feature-x").expect("sha"), before);
    let state = session
        .load_run_state()
        .expect("load")
        .expect("state from hack");
    assert_eq!(state.command, "hack");

    repo.checkout("main").expect("checkout");
    let err = compress(&mut session, &CompressOptions::default()).expect_err("main");
    assert_eq!(
        err.to_string(),
        "cannot compress 'main': it is a perennial branch"
    );
}

#[test]
fn dry_run_compress_changes_nothing_and_cannot_be_undone() {
    let repo = repo_with_feature(false);
    let before = repo.sha("feature-x").expect("sha");

    let options = SessionOptions {
        dry_run: true,
        echo_commands: false,
    };
    let mut session = Session::open(repo.path(), &options).expect("session");
    let outcome = compress(&mut session, &CompressOptions::default()).expect("compress");
    assert!(matches!(outcome, Outcome::Completed));
    assert_eq!(repo.sha("feature-x").expect("sha"), before);

    let err = undo(&mut open(&repo)).expect_err("dry run");
    assert!(matches!(assert_validation(&err), ValidationError::DryRun));
}

#[test]
fn hack_then_undo_removes_the_branch_and_its_lineage() {
    let repo = TestRepo::new().expect("repo");
    let mut session = open(&repo);
    hack(&mut session, "feature-y").expect("hack");
    assert_eq!(repo.current_branch().expect("branch"), "feature-y");
    assert_eq!(session.config().lineage.parent("feature-y"), Some("main"));

    undo(&mut open(&repo)).expect("undo");
    assert!(!repo.branch_exists("feature-y"));
    assert_eq!(repo.current_branch().expect("branch"), "main");
    let config = load_config(&repo.state_paths().config_path).expect("config");
    assert!(!config.lineage.has_parent("feature-y"));
}

#[test]
fn kill_then_undo_brings_the_branch_back() {
    let repo = repo_with_feature(false);
    let before = repo.sha("feature-x").expect("sha");

    let mut session = open(&repo);
    kill(&mut session, None).expect("kill");
    assert!(!repo.branch_exists("feature-x"));
    assert_eq!(repo.current_branch().expect("branch"), "main");
    assert!(!session.config().lineage.has_parent("feature-x"));

    undo(&mut open(&repo)).expect("undo");
    assert_eq!(repo.sha("feature-x").expect("sha"), before);
    assert_eq!(repo.current_branch().expect("branch"), "feature-x");
    let config = load_config(&repo.state_paths().config_path).expect("config");
    assert_eq!(config.lineage.parent("feature-x"), Some("main"));
}

#[test]
fn undo_can_be_undone() {
    let repo = repo_with_feature(false);
    let mut session = open(&repo);
    compress(&mut session, &CompressOptions::default()).expect("compress");
    let compressed = repo.sha("feature-x").expect("sha");

    undo(&mut open(&repo)).expect("undo");
    assert_ne!(repo.sha("feature-x").expect("sha"), compressed);
    undo(&mut open(&repo)).expect("redo");
    assert_eq!(repo.sha("feature-x").expect("sha"), compressed);
}

#[test]
fn ship_lands_one_commit_on_main() {
    let repo = repo_with_feature(false);
    let mut session = open(&repo);
    let outcome = ship(&mut session, &ShipOptions::default()).expect("ship");
    assert!(matches!(outcome, Outcome::Completed));
    assert_eq!(repo.current_branch().expect("branch"), "main");
    assert!(!repo.branch_exists("feature-x"));
    assert_eq!(
        repo.log_subjects("main").expect("log"),
        vec!["first".to_string(), "initial commit".to_string()]
    );
    assert!(!session.config().lineage.has_parent("feature-x"));
}

#[test]
fn undo_without_history_is_refused() {
    let repo = TestRepo::new().expect("repo");
    let err = undo(&mut open(&repo)).expect_err("nothing to undo");
    assert!(matches!(
        assert_validation(&err),
        ValidationError::NothingToUndo
    ));
}
