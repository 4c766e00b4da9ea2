use std::io::{BufRead, Write};

use anyhow::{bail, Result};

use wire_proto::client::ParamsProvider;
use wire_sasl::engine::{NeedParams, Params};

/// Asks the person in front of the terminal, the password is not echoed
pub struct TerminalPrompt;

impl ParamsProvider for TerminalPrompt {
    fn provide(&mut self, need: NeedParams) -> Result<Params> {
        let mut params = Params::default();

        if need.authname || need.username {
            let name = prompt_line("Username: ")?;
            if need.username {
                params.username = Some(name.clone());
            }
            if need.authname {
                params.authname = Some(name);
            }
        }
        if need.realm {
            params.realm = Some(prompt_line("Realm: ")?);
        }
        if need.password {
            params.password = Some(rpassword::prompt_password("Password: ")?);
        }

        Ok(params)
    }
}

fn prompt_line(msg: &str) -> Result<String> {
    let mut stdout = std::io::stdout();
    stdout.write_all(msg.as_bytes())?;
    stdout.flush()?;

    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line)? == 0 {
        bail!("standard input is closed");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
