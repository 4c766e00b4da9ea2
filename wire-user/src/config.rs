use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVICE: &str = "foo";
pub const DEFAULT_PORT: u16 = 8001;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginStaticConfig {
    pub user_list: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "user_driver")]
pub enum UserManagement {
    Demo,
    Static(LoginStaticConfig),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub pid: Option<PathBuf>,
    pub bind_addr: SocketAddr,
    #[serde(default = "default_service")]
    pub service: String,
    /// Announced to the engine, defaults to the machine hostname
    pub hostname: Option<String>,
    pub realm: Option<String>,
    /// In preference order, defaults to every mechanism we implement
    #[serde(default)]
    pub mechanisms: Vec<String>,
    pub users: UserManagement,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_service")]
    pub service: String,
    /// Mechanisms the client is willing to use, defaults to every mechanism we implement
    #[serde(default)]
    pub mechanisms: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "role")]
pub enum AnyConfig {
    Client(ClientConfig),
    Server(ServerConfig),
}

// ---
pub type UserList = HashMap<String, UserEntry>;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserEntry {
    /// argon2 hash in the PHC string format
    pub password: String,
}

// ---
pub fn read_config<T: serde::de::DeserializeOwned>(config_file: PathBuf) -> Result<T> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}

pub fn write_config<T: Serialize>(config_file: PathBuf, config: &T) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(config_file.as_path())?;

    file.write_all(toml::to_string(config)?.as_bytes())?;

    Ok(())
}

fn default_service() -> String {
    DEFAULT_SERVICE.into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
