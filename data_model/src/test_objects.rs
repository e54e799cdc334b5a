pub mod tests {
    use std::collections::BTreeMap;

    use crate::{
        labels::PARTIAL_ITEM_KEY,
        Descriptor,
        Fingerprint,
        ObjectMetaBuilder,
        OwnerReference,
        StoredObject,
    };

    pub const TEST_NAMESPACE: &str = "test-ns";
    pub const TEST_NAME: &str = "my-conf";
    pub const TEST_FILE_NAME: &str = "data.dummy";

    pub fn mock_master(fingerprint: &str, file_name: &str) -> StoredObject {
        let descriptor = Descriptor::master(Fingerprint::from(fingerprint), file_name);
        StoredObject::new(
            ObjectMetaBuilder::default()
                .namespace(TEST_NAMESPACE)
                .name(TEST_NAME)
                .labels(descriptor.to_labels())
                .build()
                .unwrap(),
        )
    }

    pub fn mock_partial(master: &StoredObject, order: usize, chunk: &[u8]) -> StoredObject {
        let master_descriptor = Descriptor::from_object(master).unwrap();
        let descriptor = Descriptor::partial(
            master_descriptor.fingerprint,
            &master_descriptor.file_name,
            order,
        );
        mock_partial_with_labels(master, order, descriptor.to_labels(), chunk)
    }

    /// A partial with arbitrary labels, for feeding malformed groups to the
    /// combiner.
    pub fn mock_partial_with_labels(
        master: &StoredObject,
        suffix: usize,
        labels: BTreeMap<String, String>,
        chunk: &[u8],
    ) -> StoredObject {
        let mut partial = StoredObject::new(
            ObjectMetaBuilder::default()
                .namespace(master.namespace())
                .name(format!("{}-{}", master.name(), suffix))
                .labels(labels)
                .owner_references(vec![OwnerReference::to(master)])
                .build()
                .unwrap(),
        );
        partial
            .binary_data
            .insert(PARTIAL_ITEM_KEY.to_string(), chunk.to_vec());
        partial
    }

    /// Master plus its partials for `payload` cut into `block_bytes` chunks,
    /// in index order.
    pub fn mock_group(payload: &[u8], block_bytes: usize) -> (StoredObject, Vec<StoredObject>) {
        let fingerprint = Fingerprint::compute(payload, TEST_NAMESPACE, TEST_NAME);
        let master = mock_master(fingerprint.as_str(), TEST_FILE_NAME);
        let partials = payload
            .chunks(block_bytes)
            .enumerate()
            .map(|(order, chunk)| mock_partial(&master, order, chunk))
            .collect();
        (master, partials)
    }
}
