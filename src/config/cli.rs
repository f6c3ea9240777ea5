use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the blogstore binary.
#[derive(Debug, Parser)]
#[command(name = "blogstore", version, about = "Blog post storage maintenance tool")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "BLOGSTORE_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: SettingsOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List stored posts, newest first.
    List(ListArgs),
    /// Show a single post read directly from the backend.
    Show(ShowArgs),
    /// Create and store a new post.
    Create(CreateArgs),
    /// Delete a post by id.
    Delete(DeleteArgs),
    /// Rewrite every stored document in the current format.
    Resave,
}

impl Default for Command {
    fn default() -> Self {
        Self::List(ListArgs::default())
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct SettingsOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the storage backend (disk|blob).
    #[arg(long = "backend", value_name = "BACKEND", global = true)]
    pub backend: Option<String>,

    /// Override the directory holding post documents.
    #[arg(
        long = "posts-directory",
        value_name = "PATH",
        value_hint = ValueHint::DirPath,
        global = true
    )]
    pub posts_directory: Option<PathBuf>,

    /// Override the blob storage connection string.
    #[arg(long = "blob-connection-string", value_name = "CONNECTION", global = true)]
    pub blob_connection_string: Option<String>,

    /// Override the blob container name.
    #[arg(long = "blob-container", value_name = "NAME", global = true)]
    pub blob_container: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ListArgs {
    /// Include unpublished drafts.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub all: bool,

    /// Print posts as JSON.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Post identifier.
    #[arg(value_name = "ID")]
    pub id: String,

    /// Print the post as JSON.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
#[command(group(ArgGroup::new("body").required(true).args(["content", "content_file"])))]
pub struct CreateArgs {
    #[arg(long, value_name = "TITLE")]
    pub title: String,

    #[arg(long, value_name = "AUTHOR")]
    pub author: String,

    /// Post body as an HTML fragment.
    #[arg(long, value_name = "HTML")]
    pub content: Option<String>,

    /// Read the post body from a file.
    #[arg(long = "content-file", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub content_file: Option<PathBuf>,

    /// Category to attach; may be repeated.
    #[arg(long = "category", value_name = "NAME")]
    pub categories: Vec<String>,

    /// Store the post unpublished.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub draft: bool,
}

#[derive(Debug, Args, Clone)]
pub struct DeleteArgs {
    /// Post identifier.
    #[arg(value_name = "ID")]
    pub id: String,
}
