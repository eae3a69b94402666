fn main() {
    if let Err(err) = feed_reconcile::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
