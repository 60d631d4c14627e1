use super::*;

fn vector_match(similarity: f32) -> VectorMatch {
    VectorMatch {
        id: "v-1".to_string(),
        tenant_id: 1,
        document_id: 2,
        chunk_index: 0,
        content: "Refunds take 5 days.".to_string(),
        metadata: None,
        similarity,
    }
}

#[test]
fn distance_to_similarity() {
    assert!((cosine_similarity_from_distance(0.0) - 1.0).abs() < f32::EPSILON);
    assert!((cosine_similarity_from_distance(0.25) - 0.75).abs() < f32::EPSILON);
    assert!(cosine_similarity_from_distance(1.7).abs() < f32::EPSILON);
    assert!(cosine_similarity_from_distance(f32::NAN).abs() < f32::EPSILON);
}

#[test]
fn similarity_percentage_rounds() {
    assert_eq!(vector_match(0.874).similarity_percent(), 87);
    assert_eq!(vector_match(0.875).similarity_percent(), 88);
    assert_eq!(vector_match(1.2).similarity_percent(), 100);
    assert_eq!(vector_match(-0.3).similarity_percent(), 0);
}

#[test]
fn chunk_vector_serialization() {
    let record = ChunkVector {
        id: "abc".to_string(),
        tenant_id: 7,
        document_id: 9,
        chunk_index: 3,
        content: "Test content".to_string(),
        metadata: Some(r#"{"source":"upload"}"#.to_string()),
        vector: vec![0.1, 0.2],
    };

    let json = serde_json::to_string(&record).expect("can serialize json");
    let deserialized: ChunkVector = serde_json::from_str(&json).expect("can parse json");
    assert_eq!(record, deserialized);
}
