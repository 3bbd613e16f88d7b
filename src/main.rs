use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use log::{error, info};

use hooksync::{
    action::PostAction,
    cli::args::CliArgs,
    config::Settings,
    git::ManagedRepository,
    model::RepositoryName,
    push::{PushHook, PUSH_EVENT},
    server,
    webhook::Webhook,
};

fn main() -> ExitCode {
    let cli_args = CliArgs::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli_args.log_level.as_str()),
    )
    .init();

    match run(cli_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli_args: CliArgs) -> anyhow::Result<()> {
    let settings = Settings::load(&cli_args)?;

    let name = RepositoryName::from_url(&settings.repo_url)?;
    let working_copy = settings.path.join(&name.value);
    info!(
        "Syncing {} ({}) into {}",
        settings.repo_url,
        settings.version,
        working_copy.display()
    );
    let repo = ManagedRepository::new(&settings.repo_url, &settings.version, working_copy)?;
    info!("Checked out {} at {}", name, repo.commit()?);

    let action = settings.command.as_deref().and_then(PostAction::parse);

    let mut builder = Webhook::builder()
        .endpoint(settings.endpoint)
        .broadcast_instances(settings.broadcast)
        .forward_timeout(settings.forward_timeout)
        .hook(PUSH_EVENT, PushHook::new(Arc::new(repo), action));
    if let Some(secret) = settings.secret {
        builder = builder.secret(secret);
    }
    let webhook = Arc::new(builder.try_build()?);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(server::serve(&settings.host, settings.port, webhook))
}
