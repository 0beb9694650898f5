//! CLI commands

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::Value;
use sms_core::{ClientConfig, Role};
use sms_http::{ApiClient, Method, Query};
use sms_session::{
    ChannelNavigator, MountOutcome, RedirectOnUnauthenticated, SessionGuard, WatchOutcome,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the issued tokens
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "SMS_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Revoke the session and clear stored tokens
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Show backend health and session validity
    Status,

    /// GET a resource path
    Get {
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// POST JSON to a resource path
    Post {
        path: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,

        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// PUT JSON to a resource path
    Put {
        path: String,

        #[arg(long)]
        data: Option<String>,

        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// PATCH JSON to a resource path
    Patch {
        path: String,

        #[arg(long)]
        data: Option<String>,

        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// DELETE a resource path
    Delete {
        path: String,

        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Teacher management
    Teachers {
        #[command(subcommand)]
        command: TeacherCommands,
    },

    /// Guard a role's dashboard and keep its session checked until Ctrl-C
    Watch {
        /// Role the dashboard requires
        #[arg(long)]
        role: Role,
    },
}

#[derive(Subcommand)]
pub enum TeacherCommands {
    /// List teachers
    List,

    /// Send a password reset email to a teacher
    ResetPassword { id: String },
}

impl Commands {
    /// Commands that run until interrupted
    pub fn is_long_running(&self) -> bool {
        matches!(self, Commands::Watch { .. })
    }

    pub async fn execute(self, config: &ClientConfig, client: Arc<ApiClient>) -> Result<()> {
        match self {
            Commands::Login { email, password } => login(&client, &email, &password).await,
            Commands::Logout => {
                client.logout().await?;
                println!("Logged out");
                Ok(())
            }
            Commands::Whoami => whoami(&client).await,
            Commands::Status => status(&client).await,
            Commands::Get { path, query } => {
                raw(&client, Method::GET, &path, query, None).await
            }
            Commands::Post { path, data, query } => {
                raw(&client, Method::POST, &path, query, data).await
            }
            Commands::Put { path, data, query } => {
                raw(&client, Method::PUT, &path, query, data).await
            }
            Commands::Patch { path, data, query } => {
                raw(&client, Method::PATCH, &path, query, data).await
            }
            Commands::Delete { path, query } => {
                raw(&client, Method::DELETE, &path, query, None).await
            }
            Commands::Teachers { command } => command.execute(&client).await,
            Commands::Watch { role } => watch(config, client, role).await,
        }
    }
}

impl TeacherCommands {
    pub async fn execute(self, client: &ApiClient) -> Result<()> {
        match self {
            TeacherCommands::List => {
                let teachers = client.teachers().list(None).await?;
                if teachers.is_empty() {
                    println!("No teachers found");
                }
                for teacher in teachers {
                    println!(
                        "{}\t{}\t{}",
                        teacher.id,
                        teacher.name.as_deref().unwrap_or("-"),
                        teacher.email.as_deref().unwrap_or("-")
                    );
                }
                Ok(())
            }
            TeacherCommands::ResetPassword { id } => {
                let response = client.reset_teacher_password(&id).await?;
                println!(
                    "{}",
                    response
                        .message
                        .as_deref()
                        .unwrap_or("Password reset email sent")
                );
                Ok(())
            }
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}

fn build_query(pairs: Vec<(String, String)>) -> Option<Query> {
    let query: Query = pairs.into_iter().collect();
    (!query.is_empty()).then_some(query)
}

fn parse_body(data: Option<String>) -> Result<Option<Value>> {
    data.map(|raw| serde_json::from_str(&raw).context("--data must be valid JSON"))
        .transpose()
}

async fn login(client: &ApiClient, email: &str, password: &str) -> Result<()> {
    let response = client.login(email, password).await?;
    println!(
        "Logged in as {} ({})",
        response
            .user
            .email
            .as_deref()
            .or(response.user.username.as_deref())
            .unwrap_or(&response.user.id),
        response.user.role
    );
    println!("Home: {}", response.user.role.home_route());
    Ok(())
}

async fn whoami(client: &ApiClient) -> Result<()> {
    let profile = client.current_user().await?;
    println!("{}", serde_json::to_string_pretty(&profile.user)?);
    Ok(())
}

async fn status(client: &ApiClient) -> Result<()> {
    let (health, validation) = tokio::join!(client.check_health(), client.validate_session());
    println!("api:     {}", if health.api { "up" } else { "down" });
    println!(
        "auth:    {}",
        if health.auth { "token valid" } else { "no valid token" }
    );
    match validation {
        Ok(v) if v.valid => match v.user {
            Some(user) => println!("session: valid ({}, {})", user.id, user.role),
            None => println!("session: valid"),
        },
        Ok(_) => println!("session: invalid"),
        Err(e) => println!("session: unknown ({})", e.user_message()),
    }
    Ok(())
}

async fn raw(
    client: &ApiClient,
    method: Method,
    path: &str,
    query: Vec<(String, String)>,
    data: Option<String>,
) -> Result<()> {
    let query = build_query(query);
    let body = parse_body(data)?;
    let query = query.as_ref();
    let body = body.as_ref();

    let response: Value = client.send(method, path, query, body).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn watch(config: &ClientConfig, client: Arc<ApiClient>, role: Role) -> Result<()> {
    let (navigator, mut routes) = ChannelNavigator::new();
    let navigator = Arc::new(navigator);

    let listener = RedirectOnUnauthenticated::new(
        navigator.clone(),
        config.context,
        config.login_route.clone(),
    )
    .spawn(client.subscribe());

    let printer = tokio::spawn(async move {
        while let Some(route) = routes.recv().await {
            println!("-> {route}");
        }
    });

    let guard = SessionGuard::new(client.clone(), navigator, role)
        .with_poll_interval(config.session.poll_interval());

    let result = loop {
        match guard.mount().await {
            MountOutcome::Authorized(user) => {
                println!("Authorized as {} ({})", user.id, user.role);
                break Ok(());
            }
            MountOutcome::RedirectedToLogin => break Err(anyhow::anyhow!("Not logged in")),
            MountOutcome::RedirectedToHome(actual) => {
                break Err(anyhow::anyhow!("You do not have {role} access (signed in as {actual})"));
            }
            MountOutcome::Failed(message) => {
                println!("{message} Retrying in 5 seconds.");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break Ok(()),
                    () = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
                }
            }
        }
    };

    if result.is_ok() && guard.state().is_authorized {
        let unmounted = CancellationToken::new();
        let on_signal = unmounted.clone();
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });

        info!(role = %role, "Watching session");
        match guard.watch(unmounted).await {
            WatchOutcome::LoggedOut => println!("Session ended, logged out"),
            WatchOutcome::Unmounted | WatchOutcome::NotAuthorized => {}
        }
        signal.abort();
    }

    // Let pending navigations print before exiting
    drop(guard);
    listener.abort();
    let _ = listener.await;
    let _ = printer.await;
    result
}
