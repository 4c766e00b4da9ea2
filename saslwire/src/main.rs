mod prompt;
mod server;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nix::{sys::signal, unistd::Pid};

use wire_proto::client;
use wire_sasl::mechanism::PasswordClient;
use wire_sasl::types::Mechanism;
use wire_user::config::*;
use wire_user::login::*;

use prompt::TerminalPrompt;
use server::Server;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    /// A special mode dedicated to developers, NOT INTENDED FOR PRODUCTION
    #[clap(long)]
    dev: bool,

    #[clap(
        short,
        long,
        env = "SASLWIRE_CONFIG",
        default_value = "saslwire.toml"
    )]
    /// Path to the main saslwire configuration file
    config_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authenticate against a server, prompting for missing credentials
    Client {
        #[clap(short, long)]
        user: Option<String>,

        #[clap(short, long, env = "SASLWIRE_PASSWORD")]
        password: Option<String>,
    },

    #[clap(subcommand)]
    /// A daemon checking the credentials of its clients
    Server(ServerCommand),

    #[clap(subcommand)]
    /// Specific tooling, should not be part of a normal workflow, for debug & experimentation only
    Tools(ToolsCommand),
}

#[derive(Subcommand, Debug)]
enum ToolsCommand {
    PasswordHash {
        #[clap(env = "SASLWIRE_PASSWORD")]
        maybe_password: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ServerCommand {
    /// Runs the handshake server daemon
    Daemon,
    /// Reload the daemon user list
    Reload {
        #[clap(short, long, env = "SASLWIRE_PID")]
        pid: Option<i32>,
    },
    /// Manage static accounts
    #[clap(subcommand)]
    Account(AccountManagement),
}

#[derive(Subcommand, Debug)]
enum AccountManagement {
    /// Add an account
    Add {
        #[clap(short, long)]
        login: String,

        #[clap(env = "SASLWIRE_PASSWORD")]
        maybe_password: Option<String>,
    },
    /// Delete an account
    Delete {
        #[clap(short, long)]
        login: String,
    },
    /// Change password for a given account
    ChangePassword {
        #[clap(env = "SASLWIRE_OLD_PASSWORD")]
        maybe_old_password: Option<String>,

        #[clap(env = "SASLWIRE_NEW_PASSWORD")]
        maybe_new_password: Option<String>,

        #[clap(short, long)]
        login: String,
    },
}

fn tracer() {
    tracing_subscriber::fmt::init();
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "saslwire=info,wire_proto=info,wire_sasl=info")
    }

    // Abort on panic (same behavior as in Go)
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{}", panic_info);
        eprintln!("{:?}", backtrace::Backtrace::new());
        std::process::abort();
    }));

    tracer();

    let args = Args::parse();

    match &args.command {
        Command::Client { user, password } => match load_config(&args)? {
            AnyConfig::Client(config) => {
                run_client(config, user.clone(), password.clone()).await?
            }
            AnyConfig::Server(_) => {
                bail!("Your want to run a 'Client' command but your configuration file has role 'Server'.");
            }
        },
        Command::Server(subcommand) => match load_config(&args)? {
            AnyConfig::Server(config) => match subcommand {
                ServerCommand::Daemon => {
                    let server = Server::from_config(config).await?;
                    server.run().await?;
                }
                ServerCommand::Reload { pid } => reload(*pid, config.pid)?,
                ServerCommand::Account(cmd) => {
                    let user_file = match config.users {
                        UserManagement::Static(conf) => conf.user_list,
                        UserManagement::Demo => {
                            bail!("Only static account management is supported from saslwire.")
                        }
                    };
                    account_management(cmd, user_file)?;
                }
            },
            AnyConfig::Client(_) => {
                bail!("Your want to run a 'Server' command but your configuration file has role 'Client'.");
            }
        },
        Command::Tools(subcommand) => match subcommand {
            ToolsCommand::PasswordHash { maybe_password } => {
                let password = match maybe_password {
                    Some(pwd) => pwd.clone(),
                    None => rpassword::prompt_password("Enter password: ")?,
                };
                println!("{}", hash_password(&password)?);
            }
        },
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<AnyConfig> {
    if !args.dev {
        return read_config(args.config_file.clone())
            .with_context(|| format!("unable to read configuration {:?}", args.config_file));
    }

    use std::net::*;
    let loopback = IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1));
    Ok(match args.command {
        Command::Client { .. } => AnyConfig::Client(ClientConfig {
            host: loopback.to_string(),
            port: DEFAULT_PORT,
            service: DEFAULT_SERVICE.to_string(),
            mechanisms: vec![],
        }),
        _ => AnyConfig::Server(ServerConfig {
            pid: None,
            bind_addr: SocketAddr::new(loopback, DEFAULT_PORT),
            service: DEFAULT_SERVICE.to_string(),
            hostname: Some("example.tld".to_string()),
            realm: None,
            mechanisms: vec![],
            users: UserManagement::Demo,
        }),
    })
}

/// Mechanisms named in a configuration file, all of them when none is named
pub fn mechanisms(names: &[String]) -> Result<Vec<Mechanism>> {
    if names.is_empty() {
        return Ok(vec![Mechanism::Plain, Mechanism::Login]);
    }
    names
        .iter()
        .map(|n| Mechanism::from_name(n).with_context(|| format!("unsupported mechanism {}", n)))
        .collect()
}

async fn run_client(
    config: ClientConfig,
    user: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let mut engine = PasswordClient::new(mechanisms(&config.mechanisms)?);
    if let Some(user) = user {
        engine = engine.with_user(user);
    }
    if let Some(password) = password {
        engine = engine.with_password(password);
    }

    let outcome = client::authenticate(
        (config.host.as_str(), config.port),
        &config.service,
        &config.host,
        engine,
        &mut TerminalPrompt,
    )
    .await;

    if !outcome.is_success() {
        bail!("{}", outcome);
    }
    println!("{}", outcome);
    Ok(())
}

fn reload(pid: Option<i32>, pid_path: Option<PathBuf>) -> Result<()> {
    let final_pid = match (pid, pid_path) {
        (Some(pid), _) => pid,
        (_, Some(path)) => {
            let mut f = std::fs::OpenOptions::new().read(true).open(path)?;
            let mut pidstr = String::new();
            f.read_to_string(&mut pidstr)?;
            pidstr.trim().parse::<i32>()?
        }
        _ => bail!("Unable to infer your daemon's PID"),
    };
    let pid = Pid::from_raw(final_pid);
    signal::kill(pid, signal::Signal::SIGUSR1)?;
    Ok(())
}

fn new_password(prompt: &str, maybe_password: &Option<String>) -> Result<String> {
    match maybe_password {
        Some(pwd) => Ok(pwd.to_string()),
        None => {
            let password = rpassword::prompt_password(prompt)?;
            let password_confirm = rpassword::prompt_password("Confirm password: ")?;
            if password != password_confirm {
                bail!("Passwords don't match.");
            }
            Ok(password)
        }
    }
}

fn account_management(cmd: &AccountManagement, users: PathBuf) -> Result<()> {
    let mut ulist: UserList = match users.exists() {
        true => read_config(users.clone())
            .context(format!("'{:?}' must be a user database", users))?,
        false => UserList::new(),
    };

    match cmd {
        AccountManagement::Add {
            login,
            maybe_password,
        } => {
            tracing::debug!(user = login, "will-create");
            if ulist.contains_key(login) {
                bail!("user {} already exists", login);
            }

            let password = new_password("Enter password: ", maybe_password)?;
            let hash = hash_password(password.as_str()).context("unable to hash password")?;
            ulist.insert(login.clone(), UserEntry { password: hash });

            write_config(users.clone(), &ulist)?;
        }
        AccountManagement::Delete { login } => {
            tracing::debug!(user = login, "will-delete");
            ulist.remove(login);
            write_config(users.clone(), &ulist)?;
        }
        AccountManagement::ChangePassword {
            maybe_old_password,
            maybe_new_password,
            login,
        } => {
            let mut user = ulist.remove(login).context("user must exist first")?;

            let old_password = match maybe_old_password {
                Some(pwd) => pwd.to_string(),
                None => rpassword::prompt_password("Enter old password: ")?,
            };

            if !verify_password(&old_password, &user.password)? {
                bail!(format!("invalid password for login {}", login));
            }

            let new_password = new_password("Enter new password: ", maybe_new_password)?;
            user.password = hash_password(&new_password)?;

            ulist.insert(login.clone(), user);
            write_config(users.clone(), &ulist)?;
        }
    };

    Ok(())
}
