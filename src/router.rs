use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::session::CurrentUser;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Jobs { search: Option<String> },
    Profile,
    Applied,
    Admin,
    Applicants,
    Login,
    Signup,
    /// Anything unmatched lands here rather than on a 404.
    AccessDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    SignedIn,
    AdminOnly,
    GuestOnly,
}

/// Render-time decision for a route and the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Render,
    SignInRequired,
    AccessDenied,
    Redirect(Route),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavLink {
    pub label: &'static str,
    pub route: Route,
}

impl Route {
    /// Accepts a path with optional query (`/jobs?search=rust`) or a full URL.
    pub fn parse(target: &str) -> Route {
        let joined = Url::parse("http://hire.local/").and_then(|base| base.join(target.trim()));
        let Ok(url) = joined else {
            return Route::AccessDenied;
        };
        let path = url.path().trim_end_matches('/');
        match path {
            "" | "/home" => Route::Home,
            "/jobs" => Route::Jobs {
                search: url
                    .query_pairs()
                    .find(|(k, _)| k == "search")
                    .map(|(_, v)| v.into_owned())
                    .filter(|v| !v.is_empty()),
            },
            "/profile" => Route::Profile,
            "/applied" => Route::Applied,
            "/admin" => Route::Admin,
            "/applicants" => Route::Applicants,
            "/login" => Route::Login,
            "/signup" => Route::Signup,
            _ => Route::AccessDenied,
        }
    }

    /// Home-page search box: a blank query goes nowhere.
    pub fn search(query: &str) -> Option<Route> {
        let q = query.trim();
        if q.is_empty() {
            None
        } else {
            Some(Route::Jobs { search: Some(q.to_string()) })
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Jobs { search: Some(term) } if !term.is_empty() => {
                format!("/jobs?search={}", byte_serialize(term.as_bytes()).collect::<String>())
            }
            Route::Jobs { .. } => "/jobs".to_string(),
            Route::Profile => "/profile".to_string(),
            Route::Applied => "/applied".to_string(),
            Route::Admin => "/admin".to_string(),
            Route::Applicants => "/applicants".to_string(),
            Route::Login => "/login".to_string(),
            Route::Signup => "/signup".to_string(),
            Route::AccessDenied => "/access-denied".to_string(),
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Route::Home | Route::Jobs { .. } | Route::AccessDenied => Access::Public,
            Route::Profile | Route::Applied => Access::SignedIn,
            Route::Admin | Route::Applicants => Access::AdminOnly,
            Route::Login | Route::Signup => Access::GuestOnly,
        }
    }

    pub fn gate(&self, user: Option<&CurrentUser>) -> Gate {
        match (self.access(), user) {
            (Access::Public, _) => Gate::Render,
            (Access::SignedIn | Access::AdminOnly, None) => Gate::SignInRequired,
            (Access::SignedIn, Some(_)) => Gate::Render,
            (Access::AdminOnly, Some(u)) if u.is_admin() => Gate::Render,
            (Access::AdminOnly, Some(_)) => Gate::AccessDenied,
            (Access::GuestOnly, None) => Gate::Render,
            (Access::GuestOnly, Some(_)) => Gate::Redirect(Route::Home),
        }
    }
}

/// Navigation bar links for the current role.
pub fn nav_links(user: Option<&CurrentUser>) -> Vec<NavLink> {
    let link = |label, route| NavLink { label, route };
    let mut links = vec![link("Home", Route::Home), link("Jobs", Route::Jobs { search: None })];
    match user {
        None => {
            links.push(link("Login", Route::Login));
            links.push(link("Sign Up", Route::Signup));
        }
        Some(u) => {
            links.push(link("Profile", Route::Profile));
            if u.is_admin() {
                links.push(link("Admin Dashboard", Route::Admin));
                links.push(link("Applicants", Route::Applicants));
            } else {
                links.push(link("Applied Jobs", Route::Applied));
            }
        }
    }
    links
}
