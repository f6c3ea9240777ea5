use std::{path::PathBuf, process, sync::Arc};

use blogstore::{
    application::{error::AppError, error::StorageError, posts::PostStorage},
    cache::PostCache,
    config,
    domain::posts::Post,
    infra::{error::InfraError, storage, telemetry},
};
use serde::Serialize;
use time::macros::format_description;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let causes = error.messages();
    if dispatcher::has_been_set() {
        error!(error = %error, ?causes, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, ?causes, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args.command.unwrap_or_default();

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let store = storage::connect(&settings.storage)?;
    let posts = PostStorage::new(store, Arc::new(PostCache::new()));

    match command {
        config::Command::List(args) => run_list(&posts, args).await,
        config::Command::Show(args) => run_show(&posts, args).await,
        config::Command::Create(args) => run_create(&posts, args).await,
        config::Command::Delete(args) => run_delete(&posts, args).await,
        config::Command::Resave => run_resave(&posts).await,
    }
}

async fn run_list(posts: &PostStorage, args: config::ListArgs) -> Result<(), AppError> {
    let all = posts.get_all().await?;
    let visible: Vec<&Post> = all
        .iter()
        .filter(|post| args.all || post.is_published)
        .collect();

    if args.json {
        return print_json(&visible);
    }

    for post in visible {
        let marker = if post.is_published { ' ' } else { '*' };
        println!(
            "{marker} {}  {}  {}",
            post.id,
            format_date(post)?,
            post.title
        );
    }
    Ok(())
}

async fn run_show(posts: &PostStorage, args: config::ShowArgs) -> Result<(), AppError> {
    let post = posts.load(&args.id).await.map_err(|err| match err {
        StorageError::NotFound { .. } => AppError::NotFound(args.id.clone()),
        other => AppError::from(other),
    })?;

    if args.json {
        return print_json(&post);
    }

    println!("id:         {}", post.id);
    println!("title:      {}", post.title);
    println!("author:     {}", post.author);
    println!("slug:       {}", post.slug);
    println!("published:  {}", post.is_published);
    println!("date:       {}", format_date(&post)?);
    println!("categories: {}", post.categories.join(", "));
    println!("comments:   {}", post.comments.len());
    println!();
    println!("{}", post.content);
    Ok(())
}

async fn run_create(posts: &PostStorage, args: config::CreateArgs) -> Result<(), AppError> {
    let content = read_content(args.content, args.content_file).await?;
    if args.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }

    let mut post = Post::new(args.title, args.author, content);
    post.categories = args.categories;
    post.is_published = !args.draft;

    let post = posts.insert(post).await?;
    info!(
        target = "blogstore::create",
        id = %post.id,
        slug = %post.slug,
        "Post created"
    );
    println!("{}", post.id);
    Ok(())
}

async fn run_delete(posts: &PostStorage, args: config::DeleteArgs) -> Result<(), AppError> {
    posts.delete_by_id(&args.id).await?;
    info!(target = "blogstore::delete", id = %args.id, "Post deleted");
    Ok(())
}

async fn run_resave(posts: &PostStorage) -> Result<(), AppError> {
    info!(target = "blogstore::resave", "Starting resave");
    let count = posts.resave_all().await?;
    info!(target = "blogstore::resave", count, "Resave completed");
    println!("{count}");
    Ok(())
}

async fn read_content(
    content: Option<String>,
    content_file: Option<PathBuf>,
) -> Result<String, AppError> {
    match (content, content_file) {
        (_, Some(path)) => Ok(tokio::fs::read_to_string(&path)
            .await
            .map_err(InfraError::from)?),
        (Some(content), None) => Ok(content),
        (None, None) => Err(AppError::validation(
            "either --content or --content-file is required",
        )),
    }
}

fn format_date(post: &Post) -> Result<String, AppError> {
    post.pub_date
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .map_err(|err| AppError::unexpected(format!("failed to format date: {err}")))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{out}");
    Ok(())
}
