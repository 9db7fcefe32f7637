mod session;

use std::env;
use std::process;

use session::{Profile, Session};

fn main() {
    let profile = parse_profile().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("Usage: emulator [--profile <shared|sequential|gfi>] | emulator <shared|sequential|gfi>");
        process::exit(2);
    });

    let session = Session::new(profile);
    for line in session.run(profile) {
        println!("{line}");
    }
}

fn parse_profile() -> Result<Profile, String> {
    let mut args = env::args().skip(1);
    if let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--profile=") {
            Profile::from_tag(value)
        } else if arg == "--profile" {
            if let Some(value) = args.next() {
                Profile::from_tag(&value)
            } else {
                Err("Expected value after --profile".to_string())
            }
        } else {
            Profile::from_tag(&arg)
        }
    } else {
        Ok(Profile::Shared)
    }
}
