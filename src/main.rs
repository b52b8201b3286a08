fn main() {
    let args = std::env::args();

    if let Err(err) = ev::run(args) {
        eprintln!("ev error: {err:#}");
        std::process::exit(1);
    }
}
