//! Send one GET request and print the response.
//!
//! ```text
//! TOAD_URI=coaps://192.0.2.1/hello \
//! TOAD_KEY_EXCHANGE=p384_mlkem768 \
//! TOAD_INSECURE=1 \
//! TOAD_LINK_ATTEMPTS=3 \
//!   cargo run --example client
//! ```
use std::process::ExitCode;

use toad_oneshot::blocking::Client;
use toad_oneshot::config::Config;
use toad_oneshot::exchange::Outcome;
use toad_oneshot::resp::code::Human;
use toad_oneshot::retry::Attempts;
use toad_oneshot::session::{KeyExchange, PeerVerification};

const DEFAULT_URI: &str = "coap://134.102.218.18/hello";

fn env(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn config() -> Result<Config, String> {
  let mut config = Config::default();

  if let Some(kx) = env("TOAD_KEY_EXCHANGE") {
    config.security.key_exchange = kx.parse::<KeyExchange>().map_err(|e| e.to_string())?;
  }

  if env("TOAD_INSECURE").as_deref() == Some("1") {
    config.security.verification = PeerVerification::Disabled;
  }

  if let Some(n) = env("TOAD_LINK_ATTEMPTS") {
    let n = n.parse::<u16>()
             .map_err(|e| format!("TOAD_LINK_ATTEMPTS: {}", e))?;
    config.link.max_attempts = Attempts(n);
  }

  Ok(config)
}

fn main() -> ExitCode {
  simple_logger::init_with_level(log::Level::Info).unwrap();

  let uri = env("TOAD_URI").unwrap_or_else(|| DEFAULT_URI.to_string());
  let config = match config() {
    | Ok(config) => config,
    | Err(e) => {
      log::error!("bad configuration: {}", e);
      return ExitCode::FAILURE;
    },
  };

  log::info!("GET {} (key exchange {}, peer verification {:?})",
             uri,
             config.security.key_exchange,
             config.security.verification);

  let mut client = Client::new_std_config(config);
  match client.get(&uri) {
    | Ok(Outcome::Response(rep)) => {
      log::info!("ok! {} from {}", Human(rep.data().code()), rep.addr());
      println!("{}", String::from_utf8_lossy(rep.data().payload()));
      ExitCode::SUCCESS
    },
    | Ok(Outcome::Stopped(reps)) if !reps.is_empty() => {
      reps.iter().for_each(|rep| {
                   log::info!("ok! {} from {}", Human(rep.data().code()), rep.addr());
                   println!("{}", String::from_utf8_lossy(rep.data().payload()));
                 });
      ExitCode::SUCCESS
    },
    | Ok(_) => {
      log::error!("timed out waiting for a response");
      ExitCode::FAILURE
    },
    | Err(e) => {
      log::error!("error! {}", e);
      ExitCode::FAILURE
    },
  }
}
