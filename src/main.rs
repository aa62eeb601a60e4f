use std::{env, sync::Arc};

use aws_config::BehaviorVersion;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::event::OriginResponseEvent;
use crate::handler::Handler;
use crate::storage::S3Store;

mod app_state;
mod event;
mod handler;
mod request_context;
mod server;
mod storage;
mod transcode;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let on_lambda = env::var("AWS_LAMBDA_RUNTIME_API").is_ok();
    init_tracing(on_lambda);

    let app_state = AppState::new()?;
    let port = app_state.port;

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let store = S3Store::new(
        aws_sdk_s3::Client::new(&aws_config),
        app_state.max_source_bytes,
    );
    let handler = Arc::new(Handler::new(store, app_state));

    if !on_lambda {
        return server::serve(handler, port).await;
    }

    info!("Image resizing handler starting on the Lambda runtime");
    lambda_runtime::run(service_fn(|event: LambdaEvent<OriginResponseEvent>| {
        let handler = Arc::clone(&handler);
        async move { handler.handle_event(event.payload).await.map_err(Error::from) }
    }))
    .await
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("edge_resize=info"));
    if json {
        // CloudWatch stamps each line itself
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
