use structopt::StructOpt;
use tracing::info;

use gpu_broker::{logging, Broker, BrokerConfig, CliArgs};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logging::init_tracing();

    let cli_args = CliArgs::from_args();
    info!("Using options: {:?}", &cli_args);
    let config = BrokerConfig::from(cli_args);

    let broker = match Broker::new(config).await {
        Ok(broker) => broker,
        Err(err) => {
            eprintln!("failed to start broker: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = broker.run().await {
        eprintln!("broker exited: {}", err);
        std::process::exit(1);
    }
}
