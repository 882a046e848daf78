fn main() -> anyhow::Result<()> {
    notey::cli::run()
}
