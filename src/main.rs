fn main() {
    if let Err(e) = arayuru_lib::run() {
        eprintln!("arayuru-recorder: {}", e);
        std::process::exit(1);
    }
}
