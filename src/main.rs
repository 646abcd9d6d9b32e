use genreel::{logger, CancelSignal, Config, GenerationRequest, Pipeline};
use std::io::{self, Read};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();
    logger::init_with_config(logger::LoggerConfig::from_env())?;

    if dotenv_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    logger::log_startup_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    let config = Config::from_env()?;
    logger::log_config_info(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("serve") {
        #[cfg(feature = "server")]
        {
            genreel::server::run(config).await?;
            return Ok(());
        }
        #[cfg(not(feature = "server"))]
        {
            log::error!("❌ This build has no HTTP server, rebuild with --features server");
            std::process::exit(2);
        }
    }

    let base_prompt = if args.is_empty() {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input)?;
        input
    } else {
        args.join(" ")
    };

    let request = match GenerationRequest::new(base_prompt) {
        Ok(request) => request,
        Err(e) => {
            log::error!("❌ {}", e);
            eprintln!("usage: genreel <prompt...> | genreel serve");
            std::process::exit(2);
        }
    };

    let pipeline = Pipeline::from_config(&config).await;

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("⚠️  Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    match pipeline.run_with_cancel(request, &cancel).await {
        Ok(output) => {
            println!("Image: {}", output.image_reference);
            println!("Video: {}", output.video_reference);
            println!("Caption: {}", output.caption);
            Ok(())
        }
        Err(failure) => {
            log::error!("❌ Pipeline failed: {}", failure);
            eprintln!("{} ({})", failure, failure.error.kind());
            std::process::exit(1);
        }
    }
}
