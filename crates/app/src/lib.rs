//! Courier - command-line caller of the request pipeline
//!
//! Loads a collection with its environment, globals and preferences, then
//! runs one request, a folder, or generates a snippet.

pub mod cli;
pub mod load;
pub mod report;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use courier_application::ports::{AuthorizationCodeFetcher, CancellationToken};
use courier_infrastructure::{
    LoopbackAuthorizationFetcher, QuickJsRuntime, RequestInput, default_services, generate_code, request,
    run_folder,
};
use tracing::info;

use cli::{CodegenArgs, Command, FolderArgs, RunArgs};
use load::Workspace;

fn authorization() -> Arc<dyn AuthorizationCodeFetcher> {
    Arc::new(
        LoopbackAuthorizationFetcher::new()
            .with_opener(|url| eprintln!("Open this URL to authorize:\n  {url}")),
    )
}

fn input(workspace: &Workspace, key: &str, cancel: &CancellationToken) -> Result<RequestInput> {
    let item = workspace.find_request(key)?;
    let mut input = RequestInput::new(item, Arc::clone(&workspace.collection));
    input.environment = workspace.environment.clone();
    input.global_variables = workspace.globals.clone();
    input.preferences = workspace.preferences.clone();
    input.data_dir = workspace.data_dir.clone();
    input.cancel = cancel.clone();
    input.authorization = Some(authorization());
    Ok(input)
}

async fn run(args: RunArgs, cancel: &CancellationToken) -> Result<bool> {
    let workspace = Workspace::load(&args.source)?;
    let mut input = input(&workspace, &args.request, cancel)?;
    input.delay_ms = args.delay;

    let ctx = request(input).await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report::render_json(&ctx))?);
    } else {
        print!("{}", report::render_text(&ctx));
    }
    Ok(!report::failed(&ctx))
}

async fn folder(args: FolderArgs, cancel: &CancellationToken) -> Result<bool> {
    let workspace = Workspace::load(&args.source)?;
    let first = courier_infrastructure::folder_requests(&workspace.collection, args.folder.as_deref())
        .ok_or_else(|| anyhow!("no folder {:?}", args.folder.as_deref().unwrap_or_default()))?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("nothing to run"))?;
    let mut template = input(&workspace, &first.uid, cancel)?;
    template.delay_ms = args.delay;

    let services = default_services(template.authorization.clone());
    let run = run_folder(template, args.folder.as_deref(), &services)
        .await
        .ok_or_else(|| anyhow!("folder disappeared"))?;
    info!(sent = run.contexts.len(), stopped = run.stopped, "folder run complete");

    if args.json {
        let reports: Vec<_> = run.contexts.iter().map(report::render_json).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "results": reports, "stopped": run.stopped }))?
        );
    } else {
        for ctx in &run.contexts {
            print!("{}", report::render_text(ctx));
        }
        let failures = run.contexts.iter().filter(|ctx| report::failed(ctx)).count();
        println!("\n{} requests, {failures} failed", run.contexts.len());
    }
    Ok(run.contexts.iter().all(|ctx| !report::failed(ctx)))
}

async fn codegen(args: CodegenArgs, cancel: &CancellationToken) -> Result<bool> {
    let workspace = Workspace::load(&args.source)?;
    let input = input(&workspace, &args.request, cancel)?;
    let snippet = generate_code(input.into_context_inputs(), args.language, &QuickJsRuntime::default()).await?;
    println!("{}", snippet.render());
    Ok(true)
}

/// Runs `command`; `Ok(false)` when a request, assertion or test failed.
///
/// # Errors
///
/// Returns loading failures and codegen preparation failures.
pub async fn execute(command: Command, cancel: CancellationToken) -> Result<bool> {
    match command {
        Command::Run(args) => run(args, &cancel).await,
        Command::Folder(args) => folder(args, &cancel).await,
        Command::Codegen(args) => codegen(args, &cancel).await,
    }
}
