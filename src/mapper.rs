//! Member-name rules for the two HisDB sources.
//!
//! The public and private archives are packaged independently and disagree on
//! naming; every bit of that knowledge lives here as pure string functions so
//! the pipeline itself never looks at a member name.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::DatasetProfile;
use crate::domain::{CollectionId, Partition};
use crate::error::HisdbError;

static PRIVATE_MEMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^-]*-([^-]+)-").expect("static regex"));

/// An image member of an outer archive together with its ground truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPair {
    pub collection: CollectionId,
    pub image: String,
    pub ground_truth: String,
}

/// File name part of an archive member (`all/img-CB55.zip` → `img-CB55.zip`).
pub fn member_file_name(member: &str) -> &str {
    member.rsplit('/').next().unwrap_or(member)
}

fn member_stem(member: &str) -> &str {
    let name = member_file_name(member);
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

pub fn is_image_member(member: &str, profile: &DatasetProfile) -> bool {
    !member.ends_with('/') && member.contains(profile.image_marker.as_str())
}

pub fn is_ground_truth_member(member: &str, profile: &DatasetProfile) -> bool {
    !member.ends_with('/') && member.contains(profile.gt_marker.as_str())
}

/// Ground-truth counterpart of an image member.
pub fn ground_truth_member(image: &str, profile: &DatasetProfile) -> String {
    image.replace(profile.image_marker.as_str(), profile.gt_marker.as_str())
}

/// Collection of a public member: the last `-` token of the file stem.
pub fn public_collection(member: &str) -> Result<CollectionId, HisdbError> {
    let stem = member_stem(member);
    let token = stem.rsplit('-').next().unwrap_or(stem);
    token
        .parse()
        .map_err(|_| HisdbError::Layout(format!("no collection in public member {member}")))
}

/// Collection of a private member: the token between the first and second
/// `-` of the file name (`img-CSG18-privateTest.zip` → `CSG18`).
pub fn private_collection(member: &str) -> Result<CollectionId, HisdbError> {
    let name = member_file_name(member);
    let token = PRIVATE_MEMBER
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            HisdbError::Layout(format!(
                "private member {member} does not match <kind>-<collection>-<suffix>"
            ))
        })?;
    token
        .parse()
        .map_err(|_| HisdbError::Layout(format!("no collection in private member {member}")))
}

pub fn partition_for_token(token: &str, profile: &DatasetProfile) -> Option<Partition> {
    profile
        .partition_tokens
        .iter()
        .find(|entry| entry.token == token)
        .map(|entry| entry.partition)
}

/// Folder an inner private archive unpacks into (the member name sans `.zip`).
pub fn private_staging_dir(member: &str) -> &str {
    member_stem(member)
}

fn pair_members<F>(
    names: &[String],
    profile: &DatasetProfile,
    collection_of: F,
) -> Result<Vec<MemberPair>, HisdbError>
where
    F: Fn(&str) -> Result<CollectionId, HisdbError>,
{
    let present: HashSet<&str> = names.iter().map(String::as_str).collect();
    let mut pairs = Vec::new();
    for image in names
        .iter()
        .filter(|name| is_image_member(name, profile) && !is_ground_truth_member(name, profile))
    {
        let ground_truth = ground_truth_member(image, profile);
        if !present.contains(ground_truth.as_str()) {
            return Err(HisdbError::Layout(format!(
                "image member {image} has no ground truth member {ground_truth}"
            )));
        }
        pairs.push(MemberPair {
            collection: collection_of(image)?,
            image: image.clone(),
            ground_truth,
        });
    }
    Ok(pairs)
}

/// Every (image, ground truth) pair of the public archive.
pub fn pair_public_members(
    names: &[String],
    profile: &DatasetProfile,
) -> Result<Vec<MemberPair>, HisdbError> {
    pair_members(names, profile, public_collection)
}

/// Every (image, ground truth) pair of the private archive.
pub fn pair_private_members(
    names: &[String],
    profile: &DatasetProfile,
) -> Result<Vec<MemberPair>, HisdbError> {
    pair_members(names, profile, private_collection)
}

/// Distinct collections in first-seen order.
pub fn collections_of(pairs: &[MemberPair]) -> Vec<CollectionId> {
    let mut seen = HashSet::new();
    pairs
        .iter()
        .filter(|pair| seen.insert(pair.collection.clone()))
        .map(|pair| pair.collection.clone())
        .collect()
}
