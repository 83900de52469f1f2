use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use qcos::config::normalize_remote;
use qcos::{CosClient, CosConfig};

#[derive(Parser)]
#[command(name = "qcos", version, about = "Transfer files to and from a COS bucket")]
struct Cli {
    /// Config file (default: ./cos.config.json, then ~/.cos.config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a remote directory
    Ls {
        /// Remote directory path
        remote: String,
    },
    /// Print metadata for a remote path
    Stat {
        /// Remote path
        remote: String,
        /// Print only the named fields, e.g. "{filesize} {sha}"
        #[arg(long)]
        format: Option<String>,
    },
    /// Download a remote file or directory tree
    Pull {
        /// Remote path; a trailing `/` pulls the whole tree
        remote: String,
        /// Local destination (default: current directory)
        local: Option<PathBuf>,
    },
    /// Upload a local file or directory tree
    Push {
        /// Local file or directory
        local: PathBuf,
        /// Remote destination path
        remote: String,
        /// Overwrite existing remote files
        #[arg(short, long)]
        force: bool,
    },
    /// Delete a remote file or directory tree
    Rm {
        /// Remote path; a trailing `/` names a directory
        remote: String,
        /// Delete directory contents recursively
        #[arg(short, long)]
        recursive: bool,
        /// Required together with --recursive to delete a directory
        #[arg(short, long)]
        force: bool,
    },
    /// Move (rename) a remote file
    Mv {
        /// Source remote path
        src: String,
        /// Destination remote path
        dest: String,
        /// Overwrite the destination if it exists
        #[arg(short, long)]
        force: bool,
    },
    /// Stream a remote file to stdout
    Cat {
        /// Remote file path
        remote: String,
    },
    /// Show the active configuration and where it was loaded from
    Env,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (config, config_path) = CosConfig::load(cli.config.as_deref())?;

    if let Command::Env = cli.command {
        println!("config: {}", config_path.display());
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let client = CosClient::new(config)?;
    match cli.command {
        Command::Ls { remote } => {
            for entry in client.list(&remote).await? {
                println!("{}", entry.name);
            }
        }
        Command::Stat { remote, format } => {
            let meta = client.stat(&remote).await?;
            match format {
                Some(format) => println!("{}", render_fields(&format, &meta)),
                None => println!("{}", serde_json::to_string_pretty(&meta)?),
            }
        }
        Command::Pull { remote, local } => {
            let local = local.unwrap_or_else(|| PathBuf::from("."));
            let failed = client.download(&remote, &local).await?;
            if failed > 0 {
                bail!("{failed} file(s) failed to download");
            }
        }
        Command::Push {
            local,
            remote,
            force,
        } => {
            let failed = client.upload(&local, &remote, force).await?;
            if failed > 0 {
                bail!("{failed} file(s) failed to upload");
            }
        }
        Command::Rm {
            remote,
            recursive,
            force,
        } => {
            let failed = client.delete(&remote, recursive, force).await?;
            if failed > 0 {
                bail!("{failed} entry(ies) failed to delete");
            }
        }
        Command::Mv { src, dest, force } => {
            client.move_object(&src, &dest, force).await?;
            println!("moved {} -> {}", normalize_remote(&src), normalize_remote(&dest));
        }
        Command::Cat { remote } => {
            let mut stdout = tokio::io::stdout();
            client
                .cat(&remote, &mut stdout)
                .await
                .context("streaming to stdout")?;
        }
        Command::Env => unreachable!("handled before client construction"),
    }
    Ok(())
}

/// Substitute `{field}` placeholders with top-level values from `meta`.
/// Unknown fields render as an empty string.
fn render_fields(format: &str, meta: &serde_json::Value) -> String {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let field = &after[..close];
                match meta.get(field) {
                    Some(serde_json::Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => {}
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
