//! Region-qualified instance ids.

/// Build the `<region>/<shortId>` label value for an instance.
///
/// When `id` is a fully-qualified resource name
/// (`arn:<partition>:<service>:<region>:<account>:<resource>`), the region
/// embedded in it wins and the resource is cut down to its trailing
/// `:`-separated segment. An empty id yields an empty string so optional
/// references (cluster, replication source) render as empty labels.
pub fn id_with_region(region: &str, id: &str) -> String {
    if id.is_empty() {
        return String::new();
    }
    if let Some((arn_region, resource)) = parse_arn(id) {
        let short = resource.rsplit(':').next().unwrap_or(resource);
        return format!("{arn_region}/{short}");
    }
    format!("{region}/{id}")
}

/// Returns `(region, resource)` for a well-formed ARN.
fn parse_arn(s: &str) -> Option<(&str, &str)> {
    let mut parts = s.splitn(6, ':');
    if parts.next()? != "arn" {
        return None;
    }
    let _partition = parts.next()?;
    let _service = parts.next()?;
    let region = parts.next()?;
    let _account = parts.next()?;
    let resource = parts.next()?;
    Some((region, resource))
}
