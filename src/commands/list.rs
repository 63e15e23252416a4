use anyhow::Result;
use caldir_agenda_core::{AgendaCoordinator, AgendaViewBuilder};

use crate::AgendaRequest;
use crate::render::Render;

pub async fn run(request: AgendaRequest) -> Result<()> {
    let mut coordinator = AgendaCoordinator::new(request.provider);
    let id = coordinator.create_view(AgendaViewBuilder::new(request.window).filter(request.filter));
    coordinator.refresh(id);

    if coordinator.next_update().await.is_none() {
        anyhow::bail!("Could not load the agenda (run with RUST_LOG=debug for details)");
    }

    if let Some(view) = coordinator.view(id) {
        println!("{}", view.render());
    }

    Ok(())
}
