use tracing::info;

fn main() -> anyhow::Result<()> {
    let ctx = optimapos_app::AppContext::bootstrap()?;

    for document_type in ctx.resolver.document_types()? {
        let statuses = ctx.resolver.statuses(&document_type.code)?;
        info!(
            code = %document_type.code,
            direction = ?document_type.direction,
            statuses = statuses.len(),
            "document type available"
        );
    }
    info!(environment = %ctx.settings.environment, "optimapos core ready");
    Ok(())
}
