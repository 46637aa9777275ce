use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sb3-goboscript",
    about = "Convert Scratch 3 (.sb3) projects into goboscript projects."
)]
pub struct Args {
    #[arg(value_name = "INPUT", help = "The .sb3 file to convert.")]
    pub input: PathBuf,

    #[arg(
        short,
        long,
        value_name = "DIR",
        help = "Directory to create the project folder in (defaults to the input's directory)."
    )]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Do not write goboscript.toml from TurboWarp settings.")]
    pub no_config: bool,

    #[arg(long, help = "Do not write postprocess.json.")]
    pub no_postprocess: bool,

    #[arg(short, long, help = "Log every target and asset as it is processed.")]
    pub verbose: bool,
}
