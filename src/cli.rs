use clap::Parser;

use crate::emitter::Target;

#[derive(Parser)]
#[command(
    version,
    about = "Merge proxy subscriptions into Clash-Meta, sing-box, Surge or Loon configs",
    long_about = None
)]
pub struct Args {
    #[arg(short, long, help = "Generator config, accept file path or URL")]
    pub generator: String,

    #[arg(short, long, help = "Emit debug log")]
    pub verbose: bool,

    #[arg(short, long, help = "Config output path, overrides the generator config")]
    pub output: Option<String>,

    #[arg(short, long, value_enum, help = "Output format, overrides the generator config")]
    pub target: Option<Target>,
}
