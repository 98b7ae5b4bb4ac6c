fn main() {
    if let Err(err) = poimap::run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}
