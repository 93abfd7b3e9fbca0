// ---------------------------------------------------------------------------
// Host detection request fields
// ---------------------------------------------------------------------------
//
// Form fields posted to the host detection listing. Continuation pages are
// requested with the same fields against the continuation URL.

use std::collections::BTreeMap;

use vulnfeed_types::RequestDescriptor;

/// Statuses requested from the service. Without this the listing omits
/// fixed detections.
pub const REQUESTED_STATUSES: &str = "New,Active,Re-Opened,Fixed";

/// Build the form fields for one descriptor.
///
/// Tag runs select hosts carrying all listed tags and request EC2 instance
/// metadata; group and IP runs select by asset group id and address.
pub fn detection_fields(request: &RequestDescriptor) -> BTreeMap<&'static str, String> {
    let mut fields = BTreeMap::new();
    fields.insert("action", "list".to_string());
    fields.insert("truncation_limit", request.page_size.to_string());
    fields.insert("show_reopened_info", "1".to_string());
    fields.insert("status", REQUESTED_STATUSES.to_string());
    fields.insert("arf_kernel_filter", request.kernel_filter.to_string());

    if !request.tags.is_empty() {
        fields.insert("use_tags", "1".to_string());
        // Tags are given either all by id or all by name; the first decides.
        let by_id = request.tags[0].parse::<u64>().is_ok();
        fields.insert("tag_set_by", if by_id { "id" } else { "name" }.to_string());
        fields.insert("tag_include_selector", "all".to_string());
        fields.insert("tag_set_include", request.tags.join(","));
        fields.insert("host_metadata", "ec2".to_string());
        fields.insert("host_metadata_fields", "instanceId".to_string());
    }

    if !request.group_ids.is_empty() {
        fields.insert("ag_ids", request.group_ids.join(","));
    }

    if !request.ips.is_empty() {
        fields.insert("ips", request.ips.join(","));
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use vulnfeed_types::KernelFilter;

    #[test]
    fn group_fields() {
        let request = RequestDescriptor::for_groups(
            vec!["101".into(), "202".into()],
            KernelFilter::OnlyExploitable,
        );
        let fields = detection_fields(&request);
        assert_eq!(fields["action"], "list");
        assert_eq!(fields["truncation_limit"], "2500");
        assert_eq!(fields["arf_kernel_filter"], "3");
        assert_eq!(fields["status"], "New,Active,Re-Opened,Fixed");
        assert_eq!(fields["ag_ids"], "101,202");
        assert!(!fields.contains_key("use_tags"));
        assert!(!fields.contains_key("ips"));
    }

    #[test]
    fn tag_fields_by_name_and_id() {
        let by_name = detection_fields(&RequestDescriptor::for_tags(
            vec!["prod".into(), "web".into()],
            KernelFilter::None,
        ));
        assert_eq!(by_name["use_tags"], "1");
        assert_eq!(by_name["tag_set_by"], "name");
        assert_eq!(by_name["tag_include_selector"], "all");
        assert_eq!(by_name["tag_set_include"], "prod,web");
        assert_eq!(by_name["host_metadata"], "ec2");
        assert_eq!(by_name["host_metadata_fields"], "instanceId");
        assert!(!by_name.contains_key("ag_ids"));

        let by_id = detection_fields(&RequestDescriptor::for_tags(
            vec!["9001".into()],
            KernelFilter::None,
        ));
        assert_eq!(by_id["tag_set_by"], "id");
    }

    #[test]
    fn ip_fields_honor_page_size() {
        let request =
            RequestDescriptor::for_ips(vec!["10.0.0.1".into(), "10.0.0.2".into()], KernelFilter::None)
                .with_page_size(0);
        let fields = detection_fields(&request);
        assert_eq!(fields["ips"], "10.0.0.1,10.0.0.2");
        assert_eq!(fields["truncation_limit"], "0");
    }
}
