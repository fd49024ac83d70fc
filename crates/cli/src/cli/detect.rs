use chat_core::{ModelVariant, registry};

use crate::cli::DetectArgs;

pub fn execute(args: DetectArgs) -> anyhow::Result<()> {
    let variant = ModelVariant::detect(&args.path.to_string_lossy());
    let profile = registry::profile(variant);
    let ctx = registry::context_defaults_for(variant);
    let sampling = registry::sampling_defaults_for(variant);

    println!("Path:           {}", args.path.display());
    println!("Variant:        {variant} ({})", profile.display_name);
    println!(
        "Context:        {} tokens, batch {}, {} threads",
        ctx.context_length, ctx.batch_size, ctx.thread_count
    );
    println!(
        "Sampling:       top_k {}, top_p {}, temperature {}, seed {}",
        sampling.top_k, sampling.top_p, sampling.temperature, sampling.seed
    );
    println!(
        "Generation:     up to {} new tokens, margin {}, add_bos {}",
        profile.max_new_tokens, profile.safety_margin, profile.add_bos
    );
    let stops: Vec<String> = registry::stop_sequences_for(variant)
        .iter()
        .map(|s| format!("{s:?}"))
        .collect();
    println!("Stop sequences: {}", stops.join(", "));
    Ok(())
}
