//! The `list-modes` report.

use crate::pipeline::{stage_plan, PipelineType};
use crate::training::HashMethod;

pub fn list_modes() {
    println!("pipeline modes:");
    for pipeline_type in [PipelineType::Goat, PipelineType::Arxiv, PipelineType::Demo] {
        let stages: Vec<String> = stage_plan(pipeline_type)
            .iter()
            .map(|stage| stage.name.clone())
            .collect();
        println!("  {:<8} {}", pipeline_type.as_str(), stages.join(" -> "));
    }

    println!("hash methods:");
    for method in [HashMethod::Software, HashMethod::Optimized, HashMethod::Hybrid] {
        let description = match method {
            HashMethod::Software => "canonical double SHA-256 on one core",
            HashMethod::Optimized => "batch hashing across all cores",
            HashMethod::Hybrid => "batch hashing, reports ASIC host availability",
        };
        println!("  {:<10} {description}", method.as_str());
    }
}
