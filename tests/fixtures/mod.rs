//! Sample jobs and work items shared by the integration tests

#![allow(dead_code)]

use submission_worker::models::{Difficulty, Job, WorkItem};

pub const BUSINESS_NAME: &str = "Acme Plumbing";

/// A job with a realistic business payload.
pub fn sample_job(job_id: &str, tier: &str) -> Job {
    let mut job = Job::new(job_id, tier);
    job.label = Some(BUSINESS_NAME.to_string());
    job.payload = serde_json::json!({
        "name": BUSINESS_NAME,
        "address": "123 Business St",
        "city": "San Francisco",
        "state": "CA",
        "zip": "94102",
        "phone": "(555) 123-4567",
        "website": "https://acme-plumbing.test",
        "email": "info@acme-plumbing.test"
    });
    job
}

/// `count` directory items whose targets are `https://dir-<n>.test`.
pub fn directory_items(count: usize) -> Vec<WorkItem> {
    (1..=count)
        .map(|n| {
            WorkItem::new(
                format!("dir-{n}"),
                format!("Directory {n}"),
                target_for(n),
                "general",
                Difficulty::Easy,
            )
        })
        .collect()
}

pub fn target_for(n: usize) -> String {
    format!("https://dir-{n}.test")
}
