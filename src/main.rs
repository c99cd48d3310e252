fn main() {
    if let Err(err) = mermaid_text_renderer::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
