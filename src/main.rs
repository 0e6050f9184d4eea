fn main() {
    if let Err(err) = inkmap::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
