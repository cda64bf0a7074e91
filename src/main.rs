use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use ec2fs::config::{init_logging, Cli};
use ec2fs::{Ec2Fs, Ec2Proxy, MockEc2};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if !cli.mock {
        // TODO: wire up a real EC2 endpoint client once request signing lands.
        error!("only --mock is supported for now");
        return ExitCode::FAILURE;
    }

    info!(
        mountpoint = %cli.mountpoint.display(),
        region = %cli.region_name,
        background = cli.background,
        "starting"
    );

    let proxy = Ec2Proxy::new(Box::new(MockEc2::new()));
    let fs = Ec2Fs::new(proxy);
    fs.init();
    fs.proxy().refresh();

    info!(
        instances = fs.proxy().instance_ids().len(),
        images = fs.proxy().image_ids().len(),
        requests = fs.proxy().request_ids().len(),
        "caches primed"
    );

    // TODO: mount the namespace through a FUSE adapter at cli.mountpoint.
    fs.destroy();
    ExitCode::SUCCESS
}
