use benchscope_core::{Result, catalogue};

pub fn run(optional_only: bool) -> Result<()> {
    let devices: Vec<_> = catalogue()
        .into_iter()
        .filter(|d| !optional_only || !d.internal)
        .collect();

    println!("{} telemetry device(s):\n", devices.len());
    println!("  {:<20} {:<26} {:<9} Description", "Command", "Name", "Kind");
    println!("  {}", "-".repeat(80));
    for info in &devices {
        let kind = if info.internal { "internal" } else { "optional" };
        println!(
            "  {:<20} {:<26} {:<9} {}",
            info.command, info.human_name, kind, info.help
        );
    }
    if !optional_only {
        println!("\nInternal devices are always active. Enable optional ones with --devices.");
    }
    Ok(())
}
