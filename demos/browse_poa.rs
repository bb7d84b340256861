use anyhow::Result;
use popler::{
    BrowseOptions, Client, GetDataOptions, Selection, browse, citations, col, get_data, save_table,
};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Set RUST_LOG=popler=debug to see requests and cache activity.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = Client::from_env()?;

    let criteria = col("genus").eq("Poa").and(col("species").eq("fendleriana"));
    let poa = browse(&client, &BrowseOptions::new().criteria(criteria))?;
    println!("{poa}");

    let dataset = get_data(&client, Selection::Browsed(&poa), GetDataOptions::default())?;
    println!("{} records from {} projects", dataset.data.n_rows(), dataset.project_keys().len());

    for citation in citations(&dataset.metadata)? {
        println!("{}", citation.text);
    }

    save_table(&dataset.data, Path::new("poa_fendleriana.json.gz"))?;
    Ok(())
}
