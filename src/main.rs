//! dynamo-utils: bulk and single-item operations on DynamoDB tables.

use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dynamo_utils::cli::{self, CliArgs};
use dynamo_utils::client;
use dynamo_utils::confirm::StdinConfirm;
use dynamo_utils::logging::init_tracing;
use dynamo_utils::store::DynamoStore;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current batch");
            signal_token.cancel();
        }
    });

    let store = DynamoStore::new(client::connect(&args.client_options()).await);
    let dest = match args.dest_client_options() {
        Some(options) => DynamoStore::new(client::connect(&options).await),
        None => store.clone(),
    };

    let result = cli::execute(&args.command, &store, &dest, &mut StdinConfirm, &cancel).await;
    match result {
        Ok(report) => {
            let mut stdout = io::stdout().lock();
            if let Err(e) = report.render(&mut stdout).and_then(|()| stdout.flush()) {
                error!(error = %e, "failed to write output");
                return ExitCode::FAILURE;
            }
            info!("{}", report.summary_line());

            if args.strict && report.is_partial_failure() {
                error!("some records were not applied");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}
