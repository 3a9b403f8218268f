use std::env;
use std::process;

use relay_watch_domain::destination::{encode_destination, parse_destination};

fn main() {
    let mut args = env::args().skip(1);
    let (Some(chain_id), Some(account)) = (args.next(), args.next()) else {
        eprintln!("Usage: encode_destination <chain_id> <account_hex>");
        process::exit(1);
    };

    let destination = match parse_destination(&chain_id, &account) {
        Ok(destination) => destination,
        Err(err) => {
            eprintln!("failed to parse destination: {err}");
            process::exit(1);
        }
    };

    let descriptor = encode_destination(&destination);
    println!("Parents: {}", descriptor.parents);
    for junction in descriptor.interior_hex() {
        println!("Junction: {junction}");
    }
}
