fn main() -> anyhow::Result<()> {
    sleeplog_lib::run()
}
