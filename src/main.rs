use simulation::{run_simulation, SimulationConfig};
use tracing_subscriber::EnvFilter;
use varve_compaction::CompactionConfigBuilder;
pub mod simulation;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            REPLICA COMPACTION SIMULATION                   ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Small, eager cadence
    let stats = run_simulation(SimulationConfig {
        proposals: 500,
        apply_workers: 4,
        seed: 42,
        compaction: CompactionConfigBuilder::new()
            .cadence_hint(8)
            .tick_interval(2)
            .build(),
    })
    .await?;
    stats.print();

    // Larger run, lazier cadence
    let stats = run_simulation(SimulationConfig {
        proposals: 5000,
        apply_workers: 16,
        seed: 7,
        compaction: CompactionConfigBuilder::new()
            .cadence_hint(256)
            .tick_interval(10)
            .build(),
    })
    .await?;
    stats.print();

    println!("\n✓ All simulations completed successfully!");
    Ok(())
}
