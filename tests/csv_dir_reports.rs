use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn write_fixture(dir: &Path) {
    fs::write(
        dir.join("branches.csv"),
        "id,name,district\nb1,Central,north\nb2,Harbor,north\nb3,Riverside,south\n",
    )
    .unwrap();
    fs::write(
        dir.join("attendance.csv"),
        "branch_id,attendance_date\nb1,2025-06-01\nb1,2025-06-08\nb2,2025-06-08\nb3,2025-06-08\n",
    )
    .unwrap();
    fs::write(dir.join("members.csv"), "branch_id,date_joined\nb1,2025-06-15\n").unwrap();
    fs::write(dir.join("events.csv"), "branch_id,event_date,title\nb2,2025-06-20,Picnic\n").unwrap();
    fs::write(
        dir.join("finance.csv"),
        "branch_id,transaction_date,amount,type,category\n\
         b1,2025-06-02,100,income,tithe\n\
         b2,2025-06-03,50,income,offering\n\
         b1,2025-06-04,30,expense,rent\n",
    )
    .unwrap();
}

fn cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("district-reports").unwrap();
    cmd.env_remove("DATABASE_URL")
        .env("RUST_LOG", "warn")
        .current_dir(dir);
    cmd
}

#[test]
fn exports_health_scores_for_one_district() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    cmd(dir.path())
        .args([
            "export",
            "--tab",
            "health",
            "--csv-dir",
            ".",
            "--district",
            "north",
            "--as-of",
            "2025-06-30",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("branch-health-score.csv"));

    let csv = fs::read_to_string(dir.path().join("branch-health-score.csv")).unwrap();
    // expense rows count toward the finance volume
    assert_eq!(
        csv,
        "branch,attendance_30d,new_members_30d,events_30d,finance_30d,score\n\
         Central,2,1,0,130,80\n\
         Harbor,1,0,1,50,48\n"
    );
}

#[test]
fn strict_mode_rejects_free_text_transaction_types() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    fs::write(
        dir.path().join("finance.csv"),
        "branch_id,transaction_date,amount,type,category\nb1,2025-06-02,100,cash out,misc\n",
    )
    .unwrap();

    cmd(dir.path())
        .args(["finance", "--csv-dir", ".", "--as-of", "2025-06-30", "--date-mode", "strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown transaction type 'cash out'"));

    cmd(dir.path())
        .args(["finance", "--csv-dir", ".", "--as-of", "2025-06-30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2025-06  0  100  -100"));
}

#[test]
fn date_mode_is_read_from_the_environment() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    fs::write(
        dir.path().join("attendance.csv"),
        "branch_id,attendance_date\nb1,last sunday\n",
    )
    .unwrap();

    cmd(dir.path())
        .env("DISTRICT_REPORTS_DATE_MODE", "STRICT")
        .args(["health", "--csv-dir", ".", "--as-of", "2025-06-30"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unparseable date 'last sunday'"));

    cmd(dir.path())
        .env("DISTRICT_REPORTS_DATE_MODE", "strict")
        .args(["health", "--csv-dir", ".", "--as-of", "2025-06-30", "--date-mode", "lenient"])
        .assert()
        .success();
}

#[test]
fn exports_pdf_under_the_tab_file_name() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    cmd(dir.path())
        .args([
            "export",
            "--tab",
            "attendance",
            "--format",
            "pdf",
            "--csv-dir",
            ".",
            "--as-of",
            "2025-06-30",
        ])
        .assert()
        .success();

    let pdf = fs::read(dir.path().join("attendance-by-branch.pdf")).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}

#[test]
fn writes_markdown_report() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    cmd(dir.path())
        .args([
            "report",
            "--csv-dir",
            ".",
            "--as-of",
            "2025-06-30",
            "--out",
            "north.md",
            "--district",
            "north",
        ])
        .assert()
        .success();

    let text = fs::read_to_string(dir.path().join("north.md")).unwrap();
    assert!(text.contains("Generated for north on 2025-06-30 (2 branches)"));
    assert!(!text.contains("Riverside"));
}

#[test]
fn database_commands_need_a_connection_string() {
    let dir = tempfile::tempdir().unwrap();

    cmd(dir.path())
        .args(["health"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL must be set"));
}
