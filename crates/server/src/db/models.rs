use skillswap_core::{Experience, FreelancerProfile, Role};

/// A freelancer joined with their optional profile row. Skills are stored as
/// a JSON array.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub title: Option<String>,
    pub bio: Option<String>,
    pub hourly_rate: Option<f64>,
    pub skills: Option<String>,
}

impl ProfileRow {
    pub fn skills(&self) -> Vec<String> {
        self.skills
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }

    pub fn into_profile(self, experience: Vec<Experience>) -> FreelancerProfile {
        let skills = self.skills();
        FreelancerProfile {
            id: self.id,
            name: self.name,
            email: self.email,
            title: self.title.unwrap_or_default(),
            bio: self.bio.unwrap_or_default(),
            hourly_rate: self.hourly_rate,
            skills,
            experience,
        }
    }
}
