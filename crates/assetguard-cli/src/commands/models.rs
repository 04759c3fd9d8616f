use assetguard_core::Topology;

/// Run the models command.
pub fn run() {
    println!("Registered models");
    println!();
    println!(
        "{:<8} {:<16} {:<16} {:<30} {}",
        "Sensors", "Policy", "Model", "Safety from", "Sustainability from"
    );
    println!("{}", "-".repeat(100));
    for (count, policy, topology) in Topology::REGISTERED {
        let measures = topology.measures();
        println!(
            "{:<8} {:<16} {:<16} {:<30} {}",
            count,
            policy,
            topology.model_name(),
            measures.safety.join(", "),
            measures.sustainability.join(", ")
        );
    }
    println!();
    println!("Parameters");
    for (_, _, topology) in Topology::REGISTERED {
        println!(
            "  {:<16} {}",
            topology.model_name(),
            topology.parameter_names().join(" ")
        );
    }
}
