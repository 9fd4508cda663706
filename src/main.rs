use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pxitool::chunks::ihdr::Encryption;
use pxitool::config::InstanceConfig;
use pxitool::engine::{Decoder, Encoder};

#[derive(Parser)]
#[command(name = "pxitool", version = "1.0.0", about = "PXI instance backup container CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a PXI archive from an instance configuration document
    Create {
        #[arg(short, long)]
        output: PathBuf,
        /// Path to the instance configuration JSON (input schema)
        #[arg(short, long)]
        config: PathBuf,
        /// Encrypt with AES-256-GCM; prompts for a password if none is supplied
        #[arg(short, long)]
        encrypt: bool,
        /// Volume ids to leave out of the archive
        #[arg(long = "exclude", value_delimiter = ',')]
        exclude: Vec<String>,
    },
    /// Print archive metadata without extracting volume data
    Inspect {
        input: PathBuf,
        /// Don't derive a key; stop after ENCR for encrypted archives
        #[arg(long)]
        skip_encrypted: bool,
    },
    /// Walk the full chunk structure and report any integrity failure
    Validate {
        input: PathBuf,
    },
    /// Restore volumes and configuration from a PXI archive
    Restore {
        input: PathBuf,
        /// Directory volume ids are restored into (by id, as `<dir>/<id>`)
        #[arg(short = 'C', long)]
        output_dir: PathBuf,
        /// Where to write the recovered configuration JSON
        #[arg(long)]
        config_out: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Commands::Create { output, config, encrypt, exclude } => {
            let config_bytes = std::fs::read(&config)?;
            let config = InstanceConfig::from_input_json(&config_bytes)?;
            let exclude: HashSet<String> = exclude.into_iter().collect();

            let password = if encrypt { Some(resolve_password(true)?) } else { None };

            let file = File::create(&output)?;
            let encoder = Encoder::new(file);
            encoder.encode(&config, password.as_deref(), &exclude, |volume| {
                println!("  packing  {} <- {}", volume.id, volume.path);
                Ok(Box::new(File::open(&volume.path)?) as Box<dyn Read>)
            })?;

            println!("Created: {}", output.display());
        }

        Commands::Inspect { input, skip_encrypted } => {
            let encrypted = archive_is_encrypted(&input)?;
            let password = if encrypted && !skip_encrypted { Some(resolve_password(false)?) } else { None };

            let file = File::open(&input)?;
            let decoder = Decoder::new(file);
            let info = decoder.info_read(password.as_deref(), skip_encrypted)?;

            println!("── PXI Archive ──────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Version        {}", info.header.version);
            println!("  Instance type  {:?}", info.header.instance_type);
            println!("  Encryption     {:?}", info.header.encryption);
            match &info.config {
                Some(c) => println!("  Name           {}", c.name),
                None => println!("  Name           <encrypted, not decoded>"),
            }
            println!("  Volumes        ({}):", info.volume_ids.len());
            for id in &info.volume_ids {
                println!("    {id}");
            }
        }

        Commands::Validate { input } => {
            let encrypted = archive_is_encrypted(&input)?;
            let password = if encrypted { Some(resolve_password(false)?) } else { None };

            let file = File::open(&input)?;
            let decoder = Decoder::new(file);
            decoder.validate_structure(password.as_deref())?;
            println!("OK: {} is structurally valid", input.display());
        }

        Commands::Restore { input, output_dir, config_out } => {
            let encrypted = archive_is_encrypted(&input)?;
            let password = if encrypted { Some(resolve_password(false)?) } else { None };

            let file = File::open(&input)?;
            let decoder = Decoder::new(file);
            let output_dir_clone = output_dir.clone();
            let config = decoder.restore(
                password.as_deref(),
                move |id| output_dir_clone.join(id),
                &config_out,
            )?;

            println!("Restored '{}' to {}", config.name, output_dir.display());
            println!("Configuration written to {}", config_out.display());
        }
    }

    Ok(())
}

/// Peeks `IHDR.encryption` via a `skip_encrypted` info-read, which never
/// needs a password, before deciding whether to prompt for one.
fn archive_is_encrypted(path: &PathBuf) -> Result<bool, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let decoder = Decoder::new(file);
    let info = decoder.info_read(None, true)?;
    Ok(info.header.encryption == Encryption::Aes256Gcm)
}

/// `PXI_ENCRYPTION_KEY` first, else an interactive prompt with echo
/// suppressed.
fn resolve_password(confirm: bool) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if let Ok(key) = std::env::var("PXI_ENCRYPTION_KEY") {
        // Passed through as-is, including empty: derive_key rejects an empty
        // password itself rather than silently falling back to a prompt.
        return Ok(key.into_bytes());
    }
    let password = rpassword::prompt_password("PXI encryption password: ")?;
    if confirm {
        let confirmation = rpassword::prompt_password("Confirm password: ")?;
        if confirmation != password {
            return Err("passwords did not match".into());
        }
    }
    Ok(password.into_bytes())
}
