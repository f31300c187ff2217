use color_eyre::{eyre::eyre, Result};
use serde_json::json;
use stash_core::{
    CacheClearRequest, CommandInfo, Config, ExecutionOutcome, ManifestCheckRequest,
    ManifestRenderRequest, ReconcileRequest, SourceSpec, StatusRequest, VerifyRequest,
};

use crate::cli::{CacheCommand, CommandGroupCli, ManifestCommand, ReconcileArgs};

pub fn dispatch_command(group: &CommandGroupCli) -> Result<(CommandInfo, ExecutionOutcome)> {
    match group {
        CommandGroupCli::Reconcile(args) => {
            let info = CommandInfo::new("reconcile", "reconcile");
            let request = reconcile_request_from_args(args);
            with_config(info, |config| async move {
                stash_core::reconcile_assets(&config, &request).await
            })
        }
        CommandGroupCli::Status(args) => {
            let info = CommandInfo::new("status", "status");
            let request = StatusRequest {
                manifest: args.manifest.clone(),
                store: args.store.store.clone(),
            };
            with_config(info, |config| async move {
                stash_core::status(&config, &request).await
            })
        }
        CommandGroupCli::Verify(args) => {
            let info = CommandInfo::new("verify", "verify");
            let request = VerifyRequest {
                store: args.store.store.clone(),
                repair: args.repair,
            };
            with_config(info, |config| async move {
                stash_core::verify(&config, &request).await
            })
        }
        CommandGroupCli::Manifest(ManifestCommand::Check(args)) => {
            let info = CommandInfo::new("manifest", "check");
            let request = ManifestCheckRequest {
                path: args.file.clone(),
            };
            core_call(info, stash_core::manifest_check(&request))
        }
        CommandGroupCli::Manifest(ManifestCommand::Render(args)) => {
            let info = CommandInfo::new("manifest", "render");
            let request = ManifestRenderRequest {
                path: args.file.clone(),
                json: args.as_json,
            };
            core_call(info, stash_core::manifest_render(&request))
        }
        CommandGroupCli::Cache(CacheCommand::Clear(args)) => {
            let info = CommandInfo::new("cache", "clear");
            let request = CacheClearRequest {
                store: args.store.clone(),
            };
            with_config(info, |config| async move {
                stash_core::cache_clear(&config, &request).await
            })
        }
    }
}

fn reconcile_request_from_args(args: &ReconcileArgs) -> ReconcileRequest {
    let source = match &args.source_dir {
        Some(dir) => SourceSpec::Dir(dir.clone()),
        None => SourceSpec::Url(args.base_url.clone().unwrap_or_default()),
    };
    ReconcileRequest {
        manifest: args.manifest.clone(),
        source,
        store: args.store.store.clone(),
        concurrency: args.concurrency,
        timeout_ms: args.timeout_ms,
        attempts: args.attempts,
        deep_verify: args.deep_verify,
        wait: !args.no_wait,
    }
}

/// Load configuration from the environment and run an async handler on a
/// fresh runtime. A bad environment is reported as a user error.
fn with_config<F, Fut>(info: CommandInfo, handler: F) -> Result<(CommandInfo, ExecutionOutcome)>
where
    F: FnOnce(Config) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<ExecutionOutcome>>,
{
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            return Ok((
                info,
                ExecutionOutcome::user_error(
                    format!("{err:#}"),
                    json!({ "reason": "invalid_config" }),
                ),
            ))
        }
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    core_call(info, runtime.block_on(handler(config)))
}

fn core_call(
    info: CommandInfo,
    result: anyhow::Result<ExecutionOutcome>,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    let outcome = result.map_err(|err| eyre!("{err:?}"))?;
    Ok((info, outcome))
}
