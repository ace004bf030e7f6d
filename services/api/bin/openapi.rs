use doctor_api::router::ApiDoc;
use utoipa::OpenApi;

/// Renders the OpenAPI document for the doctor API and writes it to `path`.
fn write_document(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = api_doc.to_pretty_json()?;
    std::fs::write(path, json)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    write_document(ApiDoc::openapi(), "openapi.json")?;
    Ok(())
}
