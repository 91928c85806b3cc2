fn main() -> anyhow::Result<()> {
    glview::cli::run()
}
