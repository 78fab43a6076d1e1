//! C5 clustering engine: k-means (farthest-point seeding) and a threshold
//! variant over node embeddings, producing `Cluster`s with a plurality
//! entity-type theme and an average-intra-cluster-similarity confidence.

use alayasiki_core::model::Cluster;
use std::collections::HashMap;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn centroid(vectors: &[&[f32]]) -> Vec<f32> {
    let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
    let mut sum = vec![0.0f32; dim];
    for v in vectors {
        for (i, x) in v.iter().enumerate() {
            sum[i] += x;
        }
    }
    let n = vectors.len().max(1) as f32;
    sum.iter().map(|x| x / n).collect()
}

#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    pub max_clusters: usize,
    pub min_cluster_size: usize,
    pub max_iterations: usize,
    pub convergence_epsilon: f32,
    pub similarity_threshold: f32,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_clusters: 10,
            min_cluster_size: 2,
            max_iterations: 50,
            convergence_epsilon: 0.001,
            similarity_threshold: 0.8,
        }
    }
}

pub struct ClusterMember<'a> {
    pub id: &'a str,
    pub node_type: &'a str,
    pub embedding: &'a [f32],
}

fn farthest_point_seeds<'a>(members: &[ClusterMember<'a>], k: usize) -> Vec<usize> {
    if members.is_empty() {
        return Vec::new();
    }
    let mut seeds = vec![0usize];
    while seeds.len() < k && seeds.len() < members.len() {
        let mut best_idx = 0;
        let mut best_dist = -1.0f32;
        for (i, candidate) in members.iter().enumerate() {
            if seeds.contains(&i) {
                continue;
            }
            let min_sim_to_seeds = seeds
                .iter()
                .map(|&s| cosine(candidate.embedding, members[s].embedding))
                .fold(f32::MAX, f32::min);
            let distance = 1.0 - min_sim_to_seeds;
            if distance > best_dist {
                best_dist = distance;
                best_idx = i;
            }
        }
        seeds.push(best_idx);
    }
    seeds
}

/// k-means with farthest-point seeding; `k` is capped at `config.max_clusters`.
pub fn kmeans(members: &[ClusterMember], k: usize, config: &ClusteringConfig, now: i64) -> Vec<Cluster> {
    if members.is_empty() {
        return Vec::new();
    }
    let k = k.min(config.max_clusters).min(members.len()).max(1);
    let seed_indices = farthest_point_seeds(members, k);
    let mut centroids: Vec<Vec<f32>> = seed_indices.iter().map(|&i| members[i].embedding.to_vec()).collect();
    let mut assignment = vec![0usize; members.len()];

    for _ in 0..config.max_iterations {
        for (i, member) in members.iter().enumerate() {
            let (best, _) = centroids
                .iter()
                .enumerate()
                .map(|(c, centroid)| (c, cosine(member.embedding, centroid)))
                .fold((0usize, f32::MIN), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
            assignment[i] = best;
        }

        let mut moved = 0.0f32;
        for c in 0..centroids.len() {
            let cluster_vectors: Vec<&[f32]> = members
                .iter()
                .zip(&assignment)
                .filter(|(_, &a)| a == c)
                .map(|(m, _)| m.embedding)
                .collect();
            if cluster_vectors.is_empty() {
                continue;
            }
            let new_centroid = centroid(&cluster_vectors);
            moved += 1.0 - cosine(&new_centroid, &centroids[c]);
            centroids[c] = new_centroid;
        }
        if moved < config.convergence_epsilon {
            break;
        }
    }

    build_clusters(members, &assignment, &centroids, config, now)
}

/// Threshold clustering: greedily merges members into the first cluster
/// whose centroid has cosine similarity above `similarity_threshold`,
/// otherwise starts a new cluster.
pub fn threshold_cluster(members: &[ClusterMember], config: &ClusteringConfig, now: i64) -> Vec<Cluster> {
    if members.is_empty() {
        return Vec::new();
    }
    let mut assignment = vec![usize::MAX; members.len()];
    let mut centroids: Vec<Vec<f32>> = Vec::new();

    for (i, member) in members.iter().enumerate() {
        let mut matched = None;
        for (c, centroid) in centroids.iter().enumerate() {
            if cosine(member.embedding, centroid) >= config.similarity_threshold {
                matched = Some(c);
                break;
            }
        }
        match matched {
            Some(c) => {
                assignment[i] = c;
                let members_in_c: Vec<&[f32]> = members
                    .iter()
                    .zip(&assignment)
                    .filter(|(_, &a)| a == c)
                    .map(|(m, _)| m.embedding)
                    .collect();
                centroids[c] = centroid(&members_in_c);
            }
            None => {
                assignment[i] = centroids.len();
                centroids.push(member.embedding.to_vec());
            }
        }
    }

    build_clusters(members, &assignment, &centroids, config, now)
}

fn build_clusters(
    members: &[ClusterMember],
    assignment: &[usize],
    centroids: &[Vec<f32>],
    config: &ClusteringConfig,
    now: i64,
) -> Vec<Cluster> {
    let mut by_cluster: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, &c) in assignment.iter().enumerate() {
        by_cluster.entry(c).or_default().push(i);
    }

    let mut clusters = Vec::new();
    let mut cluster_ids: Vec<&usize> = by_cluster.keys().collect();
    cluster_ids.sort();

    for &c in cluster_ids {
        let member_indices = &by_cluster[c];
        if member_indices.len() < config.min_cluster_size {
            continue;
        }

        let member_ids: Vec<String> = member_indices.iter().map(|&i| members[i].id.to_string()).collect();

        let mut type_counts: HashMap<&str, usize> = HashMap::new();
        for &i in member_indices {
            *type_counts.entry(members[i].node_type).or_insert(0) += 1;
        }
        let theme = type_counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(t, _)| t.to_string())
            .unwrap_or_default();

        let mut pair_sims = Vec::new();
        for a in 0..member_indices.len() {
            for b in (a + 1)..member_indices.len() {
                pair_sims.push(cosine(members[member_indices[a]].embedding, members[member_indices[b]].embedding));
            }
        }
        let confidence = if pair_sims.is_empty() {
            1.0
        } else {
            pair_sims.iter().sum::<f32>() / pair_sims.len() as f32
        };

        clusters.push(Cluster {
            id: format!("cluster-{c}"),
            member_ids,
            centroid: centroids.get(*c).cloned().unwrap_or_default(),
            theme,
            confidence,
            updated_at: now,
        });
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kmeans_separates_two_well_separated_groups() {
        let members = vec![
            ClusterMember { id: "a", node_type: "person", embedding: &[1.0, 0.0] },
            ClusterMember { id: "b", node_type: "person", embedding: &[0.9, 0.1] },
            ClusterMember { id: "c", node_type: "organization", embedding: &[0.0, 1.0] },
            ClusterMember { id: "d", node_type: "organization", embedding: &[0.1, 0.9] },
        ];
        let clusters = kmeans(&members, 2, &ClusteringConfig::default(), 0);
        assert_eq!(clusters.len(), 2);
        for cluster in &clusters {
            assert_eq!(cluster.member_ids.len(), 2);
        }
    }

    #[test]
    fn clusters_below_min_size_are_discarded() {
        let members = vec![
            ClusterMember { id: "a", node_type: "person", embedding: &[1.0, 0.0] },
            ClusterMember { id: "b", node_type: "person", embedding: &[-1.0, 0.0] },
        ];
        let config = ClusteringConfig { min_cluster_size: 2, ..Default::default() };
        let clusters = kmeans(&members, 2, &config, 0);
        assert!(clusters.is_empty());
    }

    #[test]
    fn threshold_clustering_merges_similar_vectors() {
        let members = vec![
            ClusterMember { id: "a", node_type: "person", embedding: &[1.0, 0.0] },
            ClusterMember { id: "b", node_type: "person", embedding: &[0.99, 0.01] },
            ClusterMember { id: "c", node_type: "person", embedding: &[0.0, 1.0] },
        ];
        let config = ClusteringConfig { min_cluster_size: 1, similarity_threshold: 0.9, ..Default::default() };
        let clusters = threshold_cluster(&members, &config, 0);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn theme_is_plurality_node_type() {
        let members = vec![
            ClusterMember { id: "a", node_type: "person", embedding: &[1.0, 0.0] },
            ClusterMember { id: "b", node_type: "person", embedding: &[0.95, 0.05] },
            ClusterMember { id: "c", node_type: "organization", embedding: &[0.9, 0.1] },
        ];
        let config = ClusteringConfig { min_cluster_size: 1, ..Default::default() };
        let clusters = kmeans(&members, 1, &config, 0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].theme, "person");
    }
}
