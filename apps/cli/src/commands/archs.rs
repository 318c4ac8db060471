//! Architecture listing.

use anyhow::Result;
use colored::Colorize;
use lumen_vision::all_specs;
use serde_json::json;

pub fn execute(json_output: bool) -> Result<()> {
    if json_output {
        let out: Vec<_> = all_specs()
            .iter()
            .map(|spec| {
                json!({
                    "architecture": spec.architecture.tag(),
                    "head": spec.head_prefix,
                    "headInFeatures": spec.head_in_features,
                    "inputSize": spec.input.output_side(),
                    "pretrainedFile": spec.pretrained_file,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", "Supported Architectures".bold().cyan());
    println!();
    println!("{:<10} {:<14} {:<8} {}", "Tag", "Head", "Input", "Pretrained weights");
    println!("{}", "─".repeat(60));
    for spec in all_specs() {
        let side = spec.input.output_side();
        println!(
            "{:<10} {:<14} {:<8} {}",
            spec.architecture.tag().cyan(),
            format!("{} ({})", spec.head_prefix, spec.head_in_features),
            format!("{side}x{side}"),
            spec.pretrained_file.dimmed()
        );
    }
    println!();
    Ok(())
}
