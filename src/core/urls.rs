#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    pub const PING: &'static str = "/api/ping";

    // Staff - clients
    pub const ADMIN_CLIENTS: &'static str = "/api/admin/clients";
    pub const ADMIN_CLIENT_BY_SLUG: &'static str = "/api/admin/clients/:slug";
    pub const ADMIN_CLIENT_STATS: &'static str = "/api/admin/clients/:slug/stats";
    pub const ADMIN_ACCESS_LINK: &'static str = "/api/admin/clients/:slug/access-link";

    // Staff - controls
    pub const ADMIN_CLIENT_CONTROLS: &'static str = "/api/admin/clients/:slug/controls";
    pub const ADMIN_CLIENT_CONTROL: &'static str = "/api/admin/clients/:slug/controls/:code";
    pub const ADMIN_CONTROL_SCOPE: &'static str = "/api/admin/clients/:slug/controls/:code/scope";
    pub const ADMIN_CONTROL_EVIDENCE: &'static str =
        "/api/admin/clients/:slug/controls/:code/evidence";
    pub const ADMIN_EVIDENCE_DOWNLOAD: &'static str =
        "/api/admin/clients/:slug/controls/:code/evidence/download";
    pub const ADMIN_CONTROL_REVIEW: &'static str = "/api/admin/clients/:slug/controls/:code/review";
    pub const ADMIN_CONTROL_COMMENTS: &'static str =
        "/api/admin/clients/:slug/controls/:code/comments";

    // Client portal
    pub const CLIENT_BY_SLUG: &'static str = "/api/clients/:slug";
    pub const CLIENT_CONTROLS: &'static str = "/api/clients/:slug/controls";
    pub const CLIENT_CONTROL: &'static str = "/api/clients/:slug/controls/:code";
    pub const CLIENT_CONTROL_EVIDENCE: &'static str = "/api/clients/:slug/controls/:code/evidence";
    pub const CLIENT_CONTROL_COMMENTS: &'static str = "/api/clients/:slug/controls/:code/comments";

    // Public
    pub const CLIENT_ACCESS_EXCHANGE: &'static str = "/api/client-access/:token";
}
