use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hire::config::Config;
use hire::db::Database;
use hire::error::BoardError;
use hire::federated::GoogleTokenInfo;
use hire::identity::LocalIdentity;
use hire::image_host::{ImageHost, ImgbbHost};
use hire::mailer::FileMailer;
use hire::models::ApplicantStatus;
use hire::pages::admin::{JobForm, failure_message};
use hire::pages::applicants::ApplicantsPage;
use hire::pages::auth::{LoginForm, SignupForm};
use hire::pages::jobs::JobsPage;
use hire::pages::profile::{AvatarFile, ProfileForm};
use hire::render::{self, render_route};
use hire::router::Route;
use hire::session::SessionContext;
use hire::tui;

#[derive(Parser)]
#[command(name = "hire")]
#[command(about = "Job board - post openings, search, apply, and review applicants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Create an account and sign in
    Signup {
        username: String,
        email: String,
        password: String,
    },

    /// Sign in with email and password
    Login {
        email: String,
        password: String,

        /// Keep the session for later commands
        #[arg(long)]
        remember: bool,
    },

    /// Sign in with a Google ID token
    Google {
        id_token: String,
    },

    /// Sign out
    Logout,

    /// Send a password reset code by mail
    ResetPassword {
        email: String,
    },

    /// Set a new password with a reset code
    ConfirmReset {
        token: String,
        new_password: String,
    },

    /// Show the signed-in user
    Whoami,

    /// Render a page by path, e.g. '/jobs?search=rust'
    Open {
        path: String,
    },

    /// List jobs
    Jobs {
        /// Filter by title, description or keyword
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Apply to a job
    Apply {
        job_id: i64,
    },

    /// Withdraw a pending application
    Withdraw {
        job_id: i64,
    },

    /// List jobs you have applied to
    Applied,

    /// Post a job (admins)
    Post {
        #[arg(long)]
        title: String,

        #[arg(long)]
        description: String,

        #[arg(long)]
        salary: String,

        /// full-time or part-time
        #[arg(long, default_value = "full-time")]
        job_type: String,

        /// Comma separated keywords
        #[arg(long, default_value = "")]
        keywords: String,
    },

    /// Delete a job (admins)
    Delete {
        job_id: i64,
    },

    /// List applicants on every job (admins)
    Applicants,

    /// Accept or reject an applicant (admins)
    Review {
        job_id: i64,
        applicant: String,
        /// accept or reject
        decision: String,
    },

    /// Show or edit your profile
    Profile {
        /// New display name
        #[arg(long)]
        name: Option<String>,

        /// Image file to upload as avatar
        #[arg(long)]
        avatar: Option<PathBuf>,
    },

    /// Browse jobs interactively
    Browse {
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Grant or revoke admin (operator command)
    GrantAdmin {
        email: String,

        #[arg(long)]
        revoke: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let db = Database::open(&config.db_path())
        .with_context(|| format!("Failed to open database at {}", config.db_path().display()))?;

    if let Commands::Init = cli.command {
        db.init()?;
        println!("Database initialized at {}", db.path().display());
        return Ok(());
    }
    db.ensure_initialized()?;

    if let Commands::GrantAdmin { email, revoke } = &cli.command {
        let user = db
            .get_user_by_email(email)?
            .ok_or_else(|| anyhow!("No user with email {}", email))?;
        db.set_admin(&user.uid, !revoke)?;
        if *revoke {
            println!("Revoked admin from {}.", user.label());
        } else {
            println!("Granted admin to {}.", user.label());
        }
        return Ok(());
    }

    let mailer = FileMailer::new(config.data_dir.join("outbox"));
    let identity = LocalIdentity::new(&db, Some(config.session_file()), Box::new(mailer))?;
    let mut ctx = SessionContext::new(&db, Box::new(identity))?
        .with_federated(Box::new(GoogleTokenInfo::new(config.google_client_id.clone())));

    match cli.command {
        Commands::Init | Commands::GrantAdmin { .. } => {}

        Commands::Signup { username, email, password } => {
            let form = SignupForm { username, email, password };
            match form.submit(&mut ctx) {
                Ok(user) => println!("Welcome, {}! You are signed in.", user.name()),
                Err(e) => bail!(SignupForm::failure_message(&e)),
            }
        }

        Commands::Login { email, password, remember } => {
            let user = LoginForm { email, password, remember }.submit(&mut ctx)?;
            println!("Signed in as {}.", user.name());
            if !remember {
                println!("(Session ends with this command; pass --remember to keep it.)");
            }
        }

        Commands::Google { id_token } => {
            let user = ctx.sign_in_with_google(&id_token)?;
            println!("Signed in as {}.", user.name());
        }

        Commands::Logout => {
            ctx.logout()?;
            println!("Signed out.");
        }

        Commands::ResetPassword { email } => {
            ctx.reset_password(&email)?;
            println!(
                "Password reset code sent to {} (outbox: {}).",
                email,
                config.data_dir.join("outbox").display()
            );
        }

        Commands::ConfirmReset { token, new_password } => {
            ctx.confirm_password_reset(&token, &new_password)?;
            println!("Password updated. Sign in with the new password.");
        }

        Commands::Whoami => match ctx.user() {
            Some(user) => print!("{}", render::profile(user)),
            None => println!("Not signed in."),
        },

        Commands::Open { path } => {
            print!("{}", render_route(&Route::parse(&path), &db, ctx.user())?);
        }

        Commands::Jobs { search } => {
            let route = search
                .as_deref()
                .and_then(Route::search)
                .unwrap_or(Route::Jobs { search: None });
            print!("{}", render_route(&route, &db, ctx.user())?);
        }

        Commands::Apply { job_id } => {
            let user = ctx.require_user()?;
            let record = JobsPage::load(&db, None)?.apply(&db, user, job_id)?;
            println!("Applied to job #{} ({}).", job_id, record.status);
        }

        Commands::Withdraw { job_id } => {
            let user = ctx.require_user()?;
            if JobsPage::load(&db, None)?.withdraw(&db, user, job_id)? {
                println!("Withdrew application from job #{}.", job_id);
            } else {
                println!("Nothing withdrawn from job #{}.", job_id);
            }
        }

        Commands::Applied => {
            print!("{}", render_route(&Route::Applied, &db, ctx.user())?);
        }

        Commands::Post { title, description, salary, job_type, keywords } => {
            let user = ctx.require_user()?;
            let mut form = JobForm { title, description, salary, job_type, keywords };
            match form.submit(&db, user) {
                Ok((id, message)) => println!("{} (job #{})", message, id),
                Err(BoardError::Validation(errors)) => {
                    print!("{}", render::admin_form(&form, Some(&errors)));
                    bail!("Failed to post job: {}", errors);
                }
                Err(e) => bail!(failure_message(&e)),
            }
        }

        Commands::Delete { job_id } => {
            let user = ctx.require_user()?;
            JobsPage::load(&db, None)?.delete(&db, user, job_id)?;
            println!("Deleted job #{}.", job_id);
        }

        Commands::Applicants => {
            print!("{}", render_route(&Route::Applicants, &db, ctx.user())?);
        }

        Commands::Review { job_id, applicant, decision } => {
            let status: ApplicantStatus = decision.parse().map_err(|e: String| anyhow!(e))?;
            if status == ApplicantStatus::Pending {
                bail!("Decision must be accept or reject");
            }
            let user = ctx.require_user()?;
            let mut page = ApplicantsPage::load(&db, user)?;
            let record = page.set_status(&db, user, job_id, &applicant, status)?;
            println!(
                "{} is now {} on job #{}.",
                page.display_name(&record.id),
                record.status,
                job_id
            );
        }

        Commands::Profile { name, avatar } => {
            if name.is_none() && avatar.is_none() {
                print!("{}", render_route(&Route::Profile, &db, ctx.user())?);
                return Ok(());
            }
            let mut form = ProfileForm::for_user(ctx.require_user()?);
            if let Some(name) = name {
                form.display_name = name;
            }
            if let Some(path) = avatar {
                form.avatar = Some(
                    AvatarFile::read(&path).with_context(|| format!("Failed to read {}", path.display()))?,
                );
            }
            let host = config.imgbb_api_key.clone().map(ImgbbHost::new);
            let user = form.submit(&mut ctx, host.as_ref().map(|h| h as &dyn ImageHost))?;
            println!("Profile updated successfully!");
            print!("{}", render::profile(&user));
        }

        Commands::Browse { search } => {
            tui::run_browse(&db, ctx.user(), search.as_deref())?;
        }
    }

    Ok(())
}
