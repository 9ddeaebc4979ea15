use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::logger::log;

pub const DEFAULT_RPC_URL: &str = "https://ledger.laiosys.dev/rpc";
pub const DEFAULT_WALLET_URL: &str = "http://127.0.0.1:9377";
pub const DEFAULT_PROGRAM_ID: &str = "linkboard-program-v1";
pub const APP_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

pub fn get_rpc_url(config: &AppConfig) -> String {
    std::env::var("LINKU_RPC_URL")
        .ok()
        .or_else(|| config.general.rpc_url.clone())
        .unwrap_or_else(|| DEFAULT_RPC_URL.to_string())
}

pub fn get_wallet_url(config: &AppConfig) -> String {
    std::env::var("LINKU_WALLET_URL")
        .ok()
        .or_else(|| config.general.wallet_url.clone())
        .unwrap_or_else(|| DEFAULT_WALLET_URL.to_string())
}

pub fn get_program_id(config: &AppConfig) -> String {
    std::env::var("LINKU_PROGRAM_ID")
        .ok()
        .or_else(|| config.general.program_id.clone())
        .unwrap_or_else(|| DEFAULT_PROGRAM_ID.to_string())
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct GeneralConfig {
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub wallet_url: Option<String>,
    #[serde(default)]
    pub program_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ThemeConfig {
    pub background: Color,
    pub foreground: Color,
    pub border_active: Color,
    pub border_inactive: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub logo: Color,
    pub header: Color,
    pub hint: Color,
    pub board_ready: Color,
    pub board_loading: Color,
    pub board_error: Color,
    pub board_uninitialized: Color,
    pub session_connected: Color,
    pub session_disconnected: Color,
    pub input_border: Color,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            background: Color::Reset,
            foreground: Color::Rgb(248, 248, 242),
            border_active: Color::Rgb(139, 233, 253),
            border_inactive: Color::Rgb(98, 114, 164),
            selection_bg: Color::Rgb(68, 71, 90),
            selection_fg: Color::Rgb(139, 233, 253),
            logo: Color::Rgb(189, 147, 249),
            header: Color::Rgb(139, 233, 253),
            hint: Color::Rgb(98, 114, 164),
            board_ready: Color::Rgb(80, 250, 123),
            board_loading: Color::Rgb(255, 184, 108),
            board_error: Color::Rgb(255, 85, 85),
            board_uninitialized: Color::Rgb(241, 250, 140),
            session_connected: Color::Rgb(80, 250, 123),
            session_disconnected: Color::Rgb(255, 184, 108),
            input_border: Color::Rgb(255, 121, 198),
        }
    }
}

pub fn get_config_dir() -> PathBuf {
    let mut path = dirs::home_dir().expect("Could not find home directory");
    path.push(".linku");
    path
}

pub fn load_config() -> AppConfig {
    let mut path = get_config_dir();
    fs::create_dir_all(&path).ok();
    path.push("config.toml");

    if !path.exists() {
        let default_config = AppConfig::default();
        if let Ok(toml_str) = toml::to_string_pretty(&default_config) {
            if let Ok(mut file) = open_private(&path) {
                let _ = file.write_all(toml_str.as_bytes());
            }
        }
        return default_config;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to parse config.toml: {}.", e);
                let backup_path = path.with_extension("toml.bak");
                if let Err(backup_err) = fs::rename(&path, &backup_path) {
                    eprintln!("Failed to backup corrupted config: {}", backup_err);
                } else {
                    eprintln!("Corrupted config backed up to {:?}", backup_path);
                }
                eprintln!("Using default configuration.");
                AppConfig::default()
            }
        },
        Err(e) => {
            eprintln!("Failed to read config file: {}. Using default.", e);
            AppConfig::default()
        }
    }
}

fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        options.mode(0o600);
    }

    options.open(path)
}

// --- Board keypair ---
//
// The board account address is fixed for the lifetime of the installation:
// generated once, persisted next to the config, reused on every start. The
// secret half never leaves this machine; it proves board ownership at
// creation, while individual writes are authorized by the wallet identity.

#[derive(Debug)]
pub struct BoardKeypair {
    pub address: String,
    pub secret: Zeroizing<String>,
}

#[derive(Serialize, Deserialize)]
struct BoardKeypairFile {
    address: String,
    secret: String,
}

pub fn load_or_create_board_keypair(dir: &Path) -> anyhow::Result<BoardKeypair> {
    let path = dir.join("board.json");

    if let Ok(content) = fs::read_to_string(&path) {
        let file: BoardKeypairFile = serde_json::from_str(&content)?;
        log("board keypair: loaded from board.json");
        return Ok(BoardKeypair {
            address: file.address,
            secret: Zeroizing::new(file.secret),
        });
    }

    let mut address_bytes = [0u8; 32];
    let mut secret_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut address_bytes);
    rand::rng().fill_bytes(&mut secret_bytes);

    let file = BoardKeypairFile {
        address: URL_SAFE_NO_PAD.encode(address_bytes),
        secret: URL_SAFE_NO_PAD.encode(secret_bytes),
    };

    fs::create_dir_all(dir)?;
    let json = serde_json::to_string(&file)?;
    let mut out = open_private(&path)?;
    out.write_all(json.as_bytes())?;
    log("board keypair: generated and saved to board.json");

    Ok(BoardKeypair {
        address: file.address,
        secret: Zeroizing::new(file.secret),
    })
}
