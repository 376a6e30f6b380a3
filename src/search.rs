use crate::models::JobPosting;

/// Case-insensitive substring match against title, description, or any
/// keyword. An empty term matches everything.
pub fn matches(job: &JobPosting, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let t = term.to_lowercase();
    job.title.to_lowercase().contains(&t)
        || job.description.to_lowercase().contains(&t)
        || job.keywords.iter().any(|k| k.to_lowercase().contains(&t))
}

pub fn filter_jobs<'a>(jobs: &'a [JobPosting], term: &str) -> Vec<&'a JobPosting> {
    jobs.iter().filter(|job| matches(job, term)).collect()
}
