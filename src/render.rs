//! Plain-text views of each route, written for the terminal.

use std::fmt::Write;

use crate::db::Database;
use crate::error::{FieldErrors, Result};
use crate::models::JobPosting;
use crate::pages::admin::JobForm;
use crate::pages::applicants::ApplicantsPage;
use crate::pages::applied::AppliedJobsPage;
use crate::pages::jobs::JobsPage;
use crate::pages::profile::avatar_url;
use crate::router::{Gate, Route, nav_links};
use crate::session::CurrentUser;

pub const ACCESS_DENIED: &str = "Access denied.";
pub const SIGN_IN_REQUIRED: &str = "You must be signed in to view this page.";

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

pub fn nav(user: Option<&CurrentUser>) -> String {
    let links: Vec<String> = nav_links(user)
        .into_iter()
        .map(|l| format!("{} ({})", l.label, l.route.path()))
        .collect();
    let mut out = links.join(" | ");
    if let Some(u) = user {
        let _ = write!(out, "    signed in as {}", u.name());
    }
    out
}

pub fn footer() -> String {
    "hire job board. Find your next role.".to_string()
}

pub fn home(user: Option<&CurrentUser>) -> String {
    let mut out = String::new();
    match user {
        Some(u) => {
            let _ = writeln!(out, "Welcome back, {}!", u.name());
        }
        None => {
            let _ = writeln!(out, "Welcome to hire.");
        }
    }
    let _ = writeln!(out, "Search postings with: hire open '/jobs?search=<term>'");
    out
}

pub fn jobs(page: &JobsPage, user: Option<&CurrentUser>) -> String {
    let mut out = String::new();
    if !page.search().is_empty() {
        let _ = writeln!(out, "Search: {}", page.search());
    }
    let visible = page.visible();
    if visible.is_empty() {
        let _ = writeln!(out, "No jobs found.");
        return out;
    }
    let _ = writeln!(
        out,
        "{:<6} {:<30} {:<10} {:>10} {:<24} {:<10}",
        "ID", "TITLE", "TYPE", "SALARY", "KEYWORDS", "STATUS"
    );
    let _ = writeln!(out, "{}", "-".repeat(95));
    for job in visible {
        let _ = writeln!(
            out,
            "{:<6} {:<30} {:<10} {:>10} {:<24} {:<10}",
            job.id,
            truncate(&job.title, 30),
            job.job_type,
            job.salary,
            truncate(&job.keywords.join(", "), 24),
            status_cell(job, user),
        );
    }
    out
}

fn status_cell(job: &JobPosting, user: Option<&CurrentUser>) -> String {
    match user {
        Some(u) if u.is_admin() => format!("{} applied", job.applicants.len()),
        Some(u) => job
            .withdrawable_for(&u.uid)
            .or_else(|| job.application_for(&u.uid))
            .map(|r| r.status.to_string())
            .unwrap_or_else(|| "-".to_string()),
        None => "-".to_string(),
    }
}

pub fn applicants(page: &ApplicantsPage) -> String {
    let mut out = String::new();
    if page.jobs().is_empty() {
        let _ = writeln!(out, "No jobs posted yet.");
        return out;
    }
    for job in page.jobs() {
        let _ = writeln!(out, "Job #{} - {} ({} applicants)", job.id, job.title, job.applicants.len());
        for record in &job.applicants {
            let _ = writeln!(
                out,
                "  {:<28} {:<30} {:<9} {}",
                record.id,
                truncate(page.display_name(&record.id), 30),
                record.status,
                record.applied_at.format("%Y-%m-%d %H:%M"),
            );
        }
    }
    out
}

pub fn applied(page: &AppliedJobsPage, user: &CurrentUser) -> String {
    let mut out = String::new();
    if page.jobs().is_empty() {
        let _ = writeln!(out, "You have not applied to any jobs yet.");
        return out;
    }
    let _ = writeln!(out, "{:<6} {:<30} {:<10} {:<17}", "ID", "TITLE", "STATUS", "APPLIED");
    let _ = writeln!(out, "{}", "-".repeat(66));
    for job in page.jobs() {
        for record in job.applications_for(&user.uid) {
            let _ = writeln!(
                out,
                "{:<6} {:<30} {:<10} {:<17}",
                job.id,
                truncate(&job.title, 30),
                record.status,
                record.applied_at.format("%Y-%m-%d %H:%M"),
            );
        }
    }
    out
}

pub fn admin_form(form: &JobForm, errors: Option<&FieldErrors>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Post a new job");
    let fields = [
        ("title", "Title", &form.title),
        ("description", "Description", &form.description),
        ("salary", "Salary", &form.salary),
        ("jobType", "Job type", &form.job_type),
        ("keywords", "Keywords", &form.keywords),
    ];
    for (key, label, value) in fields {
        let _ = writeln!(out, "  {:<12} {}", format!("{}:", label), value);
        if let Some(message) = errors.and_then(|e| e.get(key)) {
            let _ = writeln!(out, "  {:<12} ! {}", "", message);
        }
    }
    let _ = writeln!(out, "Submit with: hire post --title .. --description .. --salary ..");
    out
}

pub fn profile(user: &CurrentUser) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Name: {}", user.name());
    if let Some(email) = &user.email {
        let _ = writeln!(out, "Email: {} (read-only)", email);
    }
    let _ = writeln!(out, "Avatar: {}", avatar_url(user));
    let _ = writeln!(out, "Role: {}", if user.is_admin() { "admin" } else { "member" });
    if let Some(since) = user.created_at {
        let _ = writeln!(out, "Member since: {}", since.format("%Y-%m-%d"));
    }
    out
}

/// Gates first, then loads only what the route needs.
pub fn render_route(route: &Route, db: &Database, user: Option<&CurrentUser>) -> Result<String> {
    let body = match route.gate(user) {
        Gate::SignInRequired => format!("{}\n", SIGN_IN_REQUIRED),
        Gate::AccessDenied => format!("{}\n", ACCESS_DENIED),
        Gate::Redirect(target) => return render_route(&target, db, user),
        Gate::Render => match (route, user) {
            (Route::Home, _) => home(user),
            (Route::Jobs { search }, _) => jobs(&JobsPage::load(db, search.as_deref())?, user),
            (Route::Profile, Some(u)) => profile(u),
            (Route::Applied, Some(u)) => applied(&AppliedJobsPage::load(db, u)?, u),
            (Route::Admin, Some(_)) => admin_form(&JobForm::default(), None),
            (Route::Applicants, Some(u)) => applicants(&ApplicantsPage::load(db, u)?),
            (Route::Login, _) => "Sign in with: hire login <email> <password> [--remember]\n".to_string(),
            (Route::Signup, _) => "Create an account with: hire signup <username> <email> <password>\n".to_string(),
            (Route::AccessDenied, _) => format!("{}\n", ACCESS_DENIED),
            (_, None) => format!("{}\n", SIGN_IN_REQUIRED),
        },
    };
    Ok(format!("{}\n\n{}\n{}\n", nav(user), body, footer()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{sample_posting, test_db};
    use crate::models::{ApplicantRecord, ApplicantStatus, Role};
    use crate::router::tests::user;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate("ééééééééé", 5), "éé...");
    }

    #[test]
    fn test_standard_user_never_sees_admin_views() {
        let db = test_db();
        let job = db.add_job(&sample_posting("Engineer", "x", &[]), "admin").unwrap();
        db.array_union_applicant(job, &ApplicantRecord::pending("someone")).unwrap();
        let standard = user(Role::Standard);

        for path in ["/admin", "/applicants"] {
            let out = render_route(&Route::parse(path), &db, Some(&standard)).unwrap();
            assert!(out.contains(ACCESS_DENIED), "{path}");
            assert!(!out.contains("Post a new job"));
            assert!(!out.contains("someone"));
        }
    }

    #[test]
    fn test_guest_is_asked_to_sign_in() {
        let db = test_db();
        for path in ["/applied", "/profile", "/admin"] {
            let out = render_route(&Route::parse(path), &db, None).unwrap();
            assert!(out.contains(SIGN_IN_REQUIRED), "{path}");
        }
    }

    #[test]
    fn test_admin_sees_form_and_applicants() {
        let db = test_db();
        let job = db.add_job(&sample_posting("Engineer", "x", &[]), "admin").unwrap();
        db.create_user("someone", Some("s@x.com"), "Sam").unwrap();
        db.array_union_applicant(job, &ApplicantRecord::pending("someone")).unwrap();
        let admin = user(Role::Admin);

        let form = render_route(&Route::Admin, &db, Some(&admin)).unwrap();
        assert!(form.contains("Post a new job"));
        let list = render_route(&Route::Applicants, &db, Some(&admin)).unwrap();
        assert!(list.contains("Sam"));
        assert!(list.contains("pending"));
    }

    #[test]
    fn test_signed_in_user_is_redirected_from_login() {
        let db = test_db();
        let out = render_route(&Route::Login, &db, Some(&user(Role::Standard))).unwrap();
        assert!(out.contains("Welcome back, user one!"));
    }

    #[test]
    fn test_jobs_view_shows_my_status() {
        let db = test_db();
        let me = user(Role::Standard);
        let job = db.add_job(&sample_posting("Engineer", "x", &["rust"]), "admin").unwrap();
        db.add_job(&sample_posting("Designer", "y", &[]), "admin").unwrap();
        db.array_union_applicant(job, &ApplicantRecord::pending(&me.uid)).unwrap();

        let out = render_route(&Route::parse("/jobs?search=engineer"), &db, Some(&me)).unwrap();
        assert!(out.contains("Search: engineer"));
        assert!(out.contains("Engineer"));
        assert!(out.contains("pending"));
        assert!(!out.contains("Designer"));
    }

    #[test]
    fn test_applied_view_lists_every_record() {
        let db = test_db();
        let me = user(Role::Standard);
        let job = db.add_job(&sample_posting("Engineer", "x", &[]), "admin").unwrap();
        db.array_union_applicant(job, &ApplicantRecord::pending(&me.uid)).unwrap();
        db.upsert_applicant(job, &me.uid, ApplicantStatus::Rejected).unwrap();
        db.array_union_applicant(job, &ApplicantRecord::pending(&me.uid)).unwrap();

        let out = render_route(&Route::Applied, &db, Some(&me)).unwrap();
        let rows: Vec<&str> = out.lines().filter(|l| l.contains("Engineer")).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.contains("rejected")));
        assert!(rows.iter().any(|r| r.contains("pending")));

        let listing = render_route(&Route::Jobs { search: None }, &db, Some(&me)).unwrap();
        let row = listing.lines().find(|l| l.contains("Engineer")).unwrap();
        assert!(row.contains("pending"));
    }

    #[test]
    fn test_search_box_route_renders_trimmed_term() {
        let db = test_db();
        db.add_job(&sample_posting("Rust Engineer", "x", &[]), "admin").unwrap();
        db.add_job(&sample_posting("Designer", "y", &[]), "admin").unwrap();

        let route = Route::search("  rust ").unwrap();
        let out = render_route(&route, &db, None).unwrap();
        assert!(out.contains("Search: rust\n"));
        assert!(out.contains("Rust Engineer"));
        assert!(!out.contains("Designer"));

        assert!(Route::search("   ").is_none());
    }

    #[test]
    fn test_admin_form_shows_field_errors() {
        let form = JobForm::default();
        let errors = form.validate().unwrap_err();
        let out = admin_form(&form, Some(&errors));
        assert!(out.contains("! Title is required."));
        assert!(out.contains("Job type:    full-time"));
    }
}
