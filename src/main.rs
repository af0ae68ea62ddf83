use ptah_ui::cli::commands::run;

fn main() -> anyhow::Result<()> {
    run()
}
