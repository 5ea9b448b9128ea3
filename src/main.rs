fn main() {
    let code = nob::run::run().unwrap_or_else(|err| {
        eprintln!("nob: error: {}", err);
        1
    });
    std::process::exit(code);
}
