//! Plain-text rendering of a [`FleetView`].

use std::fmt::Write;

use busalert_core::heartbeat::{HeartbeatRecord, Liveness};

use crate::view::FleetView;

const RULE_WIDTH: usize = 80;
const WORKER_ID_WIDTH: usize = 37;

/// Render the full screen for `view`.
pub fn render(view: &FleetView) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "BUS ALERT WORKER MONITOR | {}",
        view.taken_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "{rule}");

    if view.workers.is_empty() {
        let _ = writeln!(out, "\n   No active workers found.\n");
    } else {
        let _ = writeln!(
            out,
            "{:<7} {:<WORKER_ID_WIDTH$} | {:<10} | {:<25} | LAST SEEN",
            "", "WORKER ID", "STATUS", "JOB ID"
        );
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        for worker in &view.workers {
            let _ = writeln!(out, "{}", worker_line(view, worker));
        }
    }

    let _ = writeln!(out, "\n{rule}");
    let holders = if view.lease_holders.is_empty() {
        "None".to_string()
    } else {
        view.lease_holders.join(", ")
    };
    let _ = writeln!(
        out,
        "GPU LOCKS: {} active | {holders}",
        view.lease_holders.len()
    );

    if let Some(jobs) = &view.jobs {
        let _ = write!(
            out,
            "JOBS: {} total | pending {} | processing {} | completed {} | failed {}",
            jobs.total(),
            jobs.pending,
            jobs.processing,
            jobs.completed,
            jobs.failed,
        );
        if jobs.unreadable > 0 {
            let _ = write!(out, " | unreadable {}", jobs.unreadable);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "{rule}");
    out
}

fn worker_line(view: &FleetView, worker: &HeartbeatRecord) -> String {
    let marker = match worker.liveness(view.taken_at) {
        Liveness::Fresh => "[OK]",
        Liveness::Stale => "[STALE]",
    };
    let id: String = worker.worker_id.chars().take(WORKER_ID_WIDTH).collect();
    let job = worker.current_job_id.as_deref().unwrap_or("N/A");
    let gpu = if view.holds_lease(&worker.worker_id) {
        " * [GPU]"
    } else {
        ""
    };

    format!(
        "{marker:<7} {id:<WORKER_ID_WIDTH$} | {:<10} | {job:<25} | {}s ago{gpu}",
        worker.status.as_str(),
        worker.age_secs(view.taken_at),
    )
}

#[cfg(test)]
mod tests {
    use busalert_core::heartbeat::WorkerActivity;
    use busalert_store::repositories::job_repo::StatusCounts;
    use chrono::{Duration, Utc};

    use super::*;

    fn heartbeat(id: &str, age_secs: i64, activity: WorkerActivity) -> HeartbeatRecord {
        HeartbeatRecord {
            worker_id: id.into(),
            status: activity,
            current_job_id: (activity == WorkerActivity::Processing).then(|| "job_a".to_string()),
            last_seen: Utc::now() - Duration::seconds(age_secs),
            processed: 0,
            failed: 0,
        }
    }

    fn view(workers: Vec<HeartbeatRecord>, holders: &[&str]) -> FleetView {
        FleetView {
            taken_at: Utc::now(),
            workers,
            lease_holders: holders.iter().map(|s| s.to_string()).collect(),
            jobs: None,
        }
    }

    #[test]
    fn empty_fleet() {
        let out = render(&view(vec![], &[]));
        assert!(out.contains("No active workers found."));
        assert!(out.contains("GPU LOCKS: 0 active | None"));
    }

    #[test]
    fn fresh_and_stale_workers() {
        let out = render(&view(
            vec![
                heartbeat("w-fresh", 5, WorkerActivity::Processing),
                heartbeat("w-stale", 120, WorkerActivity::Idle),
            ],
            &["w-fresh"],
        ));

        let fresh = out.lines().find(|l| l.starts_with("[OK]")).unwrap();
        assert!(fresh.contains("processing"));
        assert!(fresh.contains("job_a"));
        assert!(fresh.ends_with("* [GPU]"));

        let stale = out.lines().find(|l| l.contains("w-stale")).unwrap();
        assert!(stale.starts_with("[STALE]"));
        assert!(stale.contains("N/A"));
        assert!(!stale.contains("[GPU]"));

        assert!(out.contains("GPU LOCKS: 1 active | w-fresh"));
    }

    #[test]
    fn job_summary_line() {
        let mut v = view(vec![], &[]);
        v.jobs = Some(StatusCounts {
            pending: 2,
            processing: 1,
            completed: 5,
            failed: 0,
            unreadable: 1,
        });
        let out = render(&v);
        assert!(out.contains(
            "JOBS: 8 total | pending 2 | processing 1 | completed 5 | failed 0 | unreadable 1"
        ));
    }
}
