pub mod image_helper {
    use std::path::Path;

    use image::ImageEncoder;

    use crate::core_modules::raster::Raster;
    use crate::errors::ImageIoError;

    /// Decodes any format the `image` crate understands into an RGBA raster.
    pub fn load(path: impl AsRef<Path>) -> Result<Raster, ImageIoError> {
        let image = image::open(path)?;
        Ok(Raster::try_from(&image)?)
    }

    /// Encodes `raster` as an RGBA PNG, alpha channel included.
    pub fn save(path: impl AsRef<Path>, raster: &Raster) -> Result<(), ImageIoError> {
        raster.validate()?;
        let file = std::fs::File::create(path).map_err(image::ImageError::IoError)?;
        let output = std::io::BufWriter::new(file);
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(
            raster.as_bytes(),
            raster.width(),
            raster.height(),
            image::ExtendedColorType::Rgba8,
        )?;

        Ok(())
    }
}
