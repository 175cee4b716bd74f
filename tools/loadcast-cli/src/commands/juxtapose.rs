//! Stack recorded videos side by side.

use std::path::PathBuf;

use loadcast_render_engine::juxtapose_videos;

pub async fn run(output: PathBuf, inputs: Vec<PathBuf>) -> anyhow::Result<()> {
    juxtapose_videos(&inputs, &output).await?;
    println!(
        "Juxtaposed {} videos into {}",
        inputs.len(),
        output.display()
    );
    Ok(())
}
