use anyhow::Result;

fn main() -> Result<()> {
    knull_writeups::app::run()
}
