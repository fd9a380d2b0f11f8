use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mbee_model_transfer::document::{read_document, to_pretty_string, write_document};
use mbee_model_transfer::ids::BranchScope;
use mbee_model_transfer::observability::init_logging;
use mbee_model_transfer::store::User;
use mbee_model_transfer::{build_state, build_store, config, run};

#[derive(Parser)]
#[command(
	name = "model-transfer",
	about = "Export and import MBEE model branches as portable documents"
)]
struct Cli {
	/// Acting user for export and import
	#[arg(long, global = true, env = "MTX_USER", default_value = "admin")]
	user: String,
	/// Bearer token forwarded to the element store
	#[arg(long, global = true, env = "MTX_USER_TOKEN", hide_env_values = true)]
	token: Option<String>,
	#[command(subcommand)]
	command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
	/// Serve the HTTP export/import routes (default)
	Serve,
	/// Export a branch as a JSON document
	Export {
		org: String,
		project: String,
		branch: String,
		/// Write the document here instead of stdout
		#[arg(long, short)]
		out: Option<PathBuf>,
	},
	/// Import a JSON document into a branch
	Import {
		org: String,
		project: String,
		branch: String,
		file: PathBuf,
		/// Write the re-exported branch here
		#[arg(long, short)]
		out: Option<PathBuf>,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let settings = match config::load() {
		Ok(s) => s,
		Err(e) => {
			eprintln!("failed to load config, using defaults: {}", e);
			config::Settings::default()
		}
	};
	init_logging(settings.log_level.to_level_filter())?;

	let mut user = User::new(cli.user);
	if let Some(token) = cli.token {
		user = user.with_token(token);
	}

	match cli.command.unwrap_or(Commands::Serve) {
		Commands::Serve => run(settings).await,
		Commands::Export {
			org,
			project,
			branch,
			out,
		} => {
			let scope = BranchScope::new(org, project, branch)?;
			let state = build_state(&settings, build_store(&settings).await?)?;
			let document = state.exporter.export_branch(&user, &scope).await?;
			match out {
				Some(path) => {
					write_document(&path, &document).await?;
					println!("exported {} elements to {}", document.len(), path.display());
				}
				None => println!("{}", to_pretty_string(&document)?),
			}
			Ok(())
		}
		Commands::Import {
			org,
			project,
			branch,
			file,
			out,
		} => {
			let scope = BranchScope::new(org, project, branch)?;
			let document = read_document(&file).await?;
			let state = build_state(&settings, build_store(&settings).await?)?;
			let outcome = state
				.importer
				.import_branch(&user, &scope, document)
				.await
				.with_context(|| format!("import of {} into {} failed", file.display(), scope))?;
			println!(
				"{}: {} created, {} updated, {} unchanged",
				scope, outcome.summary.created, outcome.summary.updated, outcome.summary.skipped
			);
			if let Some(path) = out {
				write_document(&path, &outcome.elements).await?;
			}
			Ok(())
		}
	}
}
