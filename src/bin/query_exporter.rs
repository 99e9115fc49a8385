use anyhow::Result;
use query_exporter::cli::{actions, actions::Action, start};

#[tokio::main]
async fn main() -> Result<()> {
    match start()? {
        action @ Action::Run { .. } => actions::run::handle(action).await,
    }
}
