mod digests;
mod patterns;
