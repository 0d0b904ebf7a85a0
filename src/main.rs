//! Variant Store - on-demand image variants over S3.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use variant_store::{
    belongs_to,
    config::{CheckConfig, Cli, Command, ServeConfig},
    create_router, create_s3_client, default_public_url, variant_height, MemoryObjectStore,
    ObjectStore, RouterConfig, S3ObjectStore, VariantService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Variant Store v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");

    let engine = config.engine_config();
    info!("  Extensions: {}", engine.supported_extensions.join(","));
    info!("  Max upload: {} bytes", engine.max_image_size_bytes);
    info!("  Thumbnail height: {}px", engine.thumbnail_height);

    if config.in_memory {
        warn!("  Storage: IN-MEMORY - images are lost when the process exits");
        let service = VariantService::new(MemoryObjectStore::new(), engine);
        return serve(service, &config).await;
    }

    let Some(bucket) = config.bucket() else {
        error!("Configuration error: S3 bucket name is required");
        return ExitCode::FAILURE;
    };

    info!("  S3 bucket: {}", bucket);
    if let Some(ref endpoint) = config.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  S3 region: {}", config.s3_region);

    let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;

    let public_base_url = config.public_base_url.clone().unwrap_or_else(|| {
        default_public_url(bucket, &config.s3_region, config.s3_endpoint.as_deref())
    });
    info!("  Public URL: {}", public_base_url);

    let store = S3ObjectStore::new(client, bucket.to_string())
        .with_public_base_url(public_base_url)
        .with_upload_parts(config.upload_part_size, config.upload_concurrency);

    info!("Connecting to S3...");
    if let Err(e) = store.ensure_bucket(&config.s3_region).await {
        error!("  Failed to reach bucket '{}': {}", bucket, e);
        error!("  Please check:");
        error!("    - Your AWS credentials are configured correctly");
        error!("    - The S3 endpoint is correct (if using MinIO/custom S3)");
        return ExitCode::FAILURE;
    }
    info!("  Bucket '{}' is ready", bucket);

    serve(VariantService::new(store, engine), &config).await
}

async fn serve<S: ObjectStore + 'static>(
    service: VariantService<S>,
    config: &ServeConfig,
) -> ExitCode {
    let router = create_router(service, build_router_config(config));
    let addr = config.bind_address();

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health", addr);
    info!(
        "  curl -F image=@photo.jpg http://{}/api/images/upload",
        addr
    );

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "variant_store=debug,tower_http=debug"
    } else {
        "variant_store=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_tracing(!config.no_tracing)
        .with_request_timeout(config.request_timeout())
        .with_max_upload(config.max_image_size_bytes);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("Variant Store Configuration Check");
    println!("═════════════════════════════════");
    println!();

    let bucket = match config.resolve_bucket() {
        Ok(b) => {
            println!("✓ Bucket: {}", b);
            b.to_string()
        }
        Err(e) => {
            println!("✗ Bucket: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref endpoint) = config.s3_endpoint {
        println!("✓ Endpoint: {}", endpoint);
    }
    println!("✓ Region: {}", config.s3_region);
    println!();

    print!("Testing S3 connection... ");

    let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;

    if let Err(e) = client
        .list_objects_v2()
        .bucket(&bucket)
        .max_keys(1)
        .send()
        .await
    {
        println!("✗ failed");
        println!();
        println!("Error: {}", aws_sdk_s3::error::DisplayErrorContext(&e));
        println!();
        println!("Please check:");
        println!("  - Your AWS credentials are configured correctly");
        println!("  - The bucket '{}' exists and is accessible", bucket);
        if config.s3_endpoint.is_some() {
            println!("  - The S3 endpoint is correct and reachable");
        }
        return ExitCode::FAILURE;
    }
    println!("✓ success");

    if let Some(ref id) = config.image {
        println!();
        print!("Looking up image '{}'... ", id);

        let store = S3ObjectStore::new(client, bucket.clone());
        let keys = match store.list_by_prefix(id).await {
            Ok(keys) => keys,
            Err(e) => {
                println!("✗ failed");
                println!("  {}", e);
                return ExitCode::FAILURE;
            }
        };

        let mut keys: Vec<String> = keys.into_iter().filter(|k| belongs_to(k, id)).collect();
        if !keys.iter().any(|k| k == id) {
            println!("✗ not found");
            return ExitCode::FAILURE;
        }
        println!("✓ found");

        keys.sort_by_key(|k| variant_height(k, id));
        for key in keys.iter().filter(|k| k.as_str() != id.as_str()) {
            match variant_height(key, id) {
                Some(height) => println!("  variant {}px: {}", height, key),
                None => println!("  unrecognized key: {}", key),
            }
        }
        println!("  {} variant(s)", keys.len() - 1);
    }

    println!();
    println!("═════════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
